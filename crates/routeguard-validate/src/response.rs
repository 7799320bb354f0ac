use std::sync::Arc;

use rand::Rng;
use routeguard_schema::evaluate;
use serde_json::Value;
use tracing::debug;

use crate::error::HttpError;
use crate::policy::ResponseFailAction;
use crate::request::{is_object_like, Request, Response, Variety};

/// Validate the handler's response against the route's response policy.
///
/// Failures never blame the client: they are logged or escalated as a 500.
pub async fn validate_response(request: &mut Request) -> Result<(), HttpError> {
    let draw = sample_draw(request, &mut rand::thread_rng());
    check_response(request, draw).await
}

/// [`validate_response`] drawing the sample from `rng`.
pub async fn validate_response_with_rng<R: Rng>(
    request: &mut Request,
    rng: &mut R,
) -> Result<(), HttpError> {
    let draw = sample_draw(request, rng);
    check_response(request, draw).await
}

/// Uniform draw in `1..=100`, only when the route samples responses.
fn sample_draw<R: Rng>(request: &Request, rng: &mut R) -> Option<u8> {
    let sampled = request
        .route
        .response
        .as_ref()
        .is_some_and(|policy| policy.sample.is_some());
    sampled.then(|| rng.gen_range(1..=100))
}

async fn check_response(request: &mut Request, draw: Option<u8>) -> Result<(), HttpError> {
    let route = Arc::clone(&request.route);
    let Some(policy) = route.response.as_ref() else {
        return Ok(());
    };

    if let (Some(sample), Some(draw)) = (policy.sample, draw) {
        if draw > sample {
            debug!(draw, sample, "response validation skipped by sampling");
            return Ok(());
        }
    }

    let Some(response) = request.response.as_ref() else {
        return Ok(());
    };
    let status_code = response.status_code();
    let status_schema = policy.status.get(&status_code);
    if status_code >= 400 && status_schema.is_none() {
        return Ok(());
    }
    let Some(schema) = status_schema.or(policy.schema.as_ref()) else {
        return Ok(());
    };

    let plain = match response {
        Response::Plain { variety, .. } => *variety == Variety::Plain,
        Response::Error(_) => true,
    };
    let body = response.body();
    if !plain || !is_object_like(body) {
        return Err(HttpError::bad_implementation(
            "Cannot validate non-object response",
        ));
    }

    let options = request.connection.validation_defaults();
    let outcome = evaluate(body, schema, &options).await;

    match outcome {
        Ok(coerced) => {
            if let (Some(value), true) = (coerced, policy.modify) {
                replace_body(request, value);
            }
            Ok(())
        }
        Err(err) if policy.fail_action == ResponseFailAction::Log => {
            request.logger.log(
                &["validation", "response", "error"],
                &Value::String(err.message),
            );
            Ok(())
        }
        Err(err) => Err(HttpError::bad_implementation(err.message).with_details(err.details)),
    }
}

fn replace_body(request: &mut Request, value: Value) {
    match request.response.as_mut() {
        Some(Response::Plain { source, .. }) => *source = value,
        Some(Response::Error(error)) => error.output.payload = value,
        None => {}
    }
}
