use std::sync::Arc;

use routeguard_schema::{evaluate, ValidationOptions};
use serde_json::Map;
use tracing::debug;

use crate::error::HttpError;
use crate::policy::FailAction;
use crate::reply::{Decision, Reply};
use crate::request::{is_object_like, Request, Response, Source};

/// How the request lifecycle continues after input validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    Continue,
    /// A custom fail handler took over with this response.
    Respond(Response),
}

/// Validate one request source against the route policy.
///
/// The bucket's pre-validation value is captured in `request.orig` and, on
/// success, the bucket is replaced by the coerced value. Failures follow the
/// route's fail action.
pub async fn validate_input(source: Source, request: &mut Request) -> Result<Next, HttpError> {
    if !is_object_like(request.bucket(source)) {
        return Err(HttpError::unsupported_media_type(format!(
            "{source} must represent an object"
        )));
    }

    let route = Arc::clone(&request.route);
    let Some(schema) = route.validate.schema(source) else {
        let original = request.bucket(source).clone();
        request.orig.capture(source, original);
        return Ok(Next::Continue);
    };

    let mut context = Map::new();
    for other in Source::ALL.into_iter().filter(|other| *other != source) {
        context.insert(other.as_str().to_string(), request.bucket(other).clone());
    }
    let options =
        ValidationOptions::with_context(context).merged_over(&request.connection.validation_defaults());

    let outcome = evaluate(request.bucket(source), schema, &options).await;
    let original = request.bucket(source).clone();
    request.orig.capture(source, original);

    let mut err = match outcome {
        Ok(coerced) => {
            if let Some(value) = coerced {
                *request.bucket_mut(source) = value;
            }
            return Ok(Next::Continue);
        }
        Err(err) => err,
    };
    if let Some(value) = err.value.take() {
        *request.bucket_mut(source) = value;
    }

    let policy = &route.validate;
    if matches!(policy.fail_action, FailAction::Ignore) {
        debug!(source = %source, violations = err.details.len(), "validation failure ignored");
        return Ok(Next::Continue);
    }

    let keys = err.keys();
    let mut error = HttpError::bad_request(err.message).with_details(err.details);
    error.set_validation(source.as_str(), keys);
    error.merge_fields(&policy.error_fields);

    request
        .logger
        .log(&["validation", "error", source.as_str()], &error.to_value());

    match &policy.fail_action {
        FailAction::Log | FailAction::Ignore => Ok(Next::Continue),
        FailAction::Custom(handler) => {
            match handler.handle(request, Reply::new(source), source, error).await {
                Decision::Continue => Ok(Next::Continue),
                Decision::Abort(error) => Err(error),
                Decision::Takeover(response) => Ok(Next::Respond(response)),
            }
        }
        FailAction::Error => Err(error),
    }
}

pub async fn headers(request: &mut Request) -> Result<Next, HttpError> {
    validate_input(Source::Headers, request).await
}

pub async fn params(request: &mut Request) -> Result<Next, HttpError> {
    validate_input(Source::Params, request).await
}

pub async fn query(request: &mut Request) -> Result<Next, HttpError> {
    validate_input(Source::Query, request).await
}

pub async fn payload(request: &mut Request) -> Result<Next, HttpError> {
    validate_input(Source::Payload, request).await
}

#[cfg(test)]
mod tests {
    use routeguard_schema::Rule;
    use serde_json::{json, Value};

    use super::*;
    use crate::log::MemoryLogger;
    use crate::policy::{RoutePolicy, ValidatePolicy};

    fn request_with(validate: ValidatePolicy) -> (Request, Arc<MemoryLogger>) {
        let logger = Arc::new(MemoryLogger::new());
        let request = Request::new(Arc::new(RoutePolicy {
            validate,
            response: None,
        }))
        .with_logger(logger.clone());
        (request, logger)
    }

    #[tokio::test]
    async fn scalar_bucket_is_unsupported_media() {
        let (request, _) = request_with(ValidatePolicy::default());
        let mut request = request.with_bucket(Source::Payload, json!("plain text"));

        let err = payload(&mut request).await.unwrap_err();
        assert_eq!(err.status_code(), 415);
        assert_eq!(err.message, "payload must represent an object");
        assert_eq!(request.orig.get(Source::Payload), None);
    }

    #[tokio::test]
    async fn context_excludes_the_validated_source() {
        let schema = routeguard_schema::Schema::dynamic(|_value: Value, options: ValidationOptions| async move {
            let mut keys: Vec<String> = options.context.keys().cloned().collect();
            keys.sort();
            assert_eq!(keys, vec!["headers", "params", "payload"]);
            Ok(None)
        });
        let (request, _) =
            request_with(ValidatePolicy::default().with_schema(Source::Query, schema));
        let mut request = request.with_bucket(Source::Query, json!({ "q": "x" }));

        assert_eq!(query(&mut request).await, Ok(Next::Continue));
        assert_eq!(request.query, json!({ "q": "x" }));
    }

    #[tokio::test]
    async fn connection_defaults_apply() {
        let policy = ValidatePolicy::default()
            .with_schema(Source::Query, Rule::object_of([("page", Rule::number())]));
        let (request, _) = request_with(policy);
        let settings = crate::request::ConnectionSettings {
            validation: Some(ValidationOptions {
                allow_unknown: true,
                ..ValidationOptions::default()
            }),
        };
        let mut request = request
            .with_connection(Arc::new(settings))
            .with_bucket(Source::Query, json!({ "page": "2", "extra": true }));

        assert_eq!(query(&mut request).await, Ok(Next::Continue));
        assert_eq!(request.query, json!({ "page": 2, "extra": true }));
    }
}
