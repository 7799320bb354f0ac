use std::sync::Arc;

use routeguard_schema::{
    func_ref, BoxFuture, DynamicSchema, JsonSchemaConfig, Rule, Schema, ValidationError,
    ValidationOptions,
};
use routeguard_validate::{
    params, payload, query, validate_input, ConnectionSettings, Decision, FailAction,
    FailHandler, Handlers, HttpError, MemoryLogger, Next, Reply, Request, Response, RoutePolicy,
    Source, ValidatePolicy,
};
use serde_json::{json, Value};

fn name_required() -> Rule {
    Rule::object_of([("name", Rule::string().required())])
}

fn request_for(validate: ValidatePolicy) -> (Request, Arc<MemoryLogger>) {
    let logger = Arc::new(MemoryLogger::new());
    let route = RoutePolicy {
        validate,
        response: None,
    };
    let request = Request::new(Arc::new(route)).with_logger(logger.clone());
    (request, logger)
}

#[tokio::test]
async fn missing_required_field_is_bad_request() {
    let (request, logger) =
        request_for(ValidatePolicy::default().with_schema(Source::Payload, name_required()));
    let mut request = request.with_bucket(Source::Payload, json!({}));

    let err = payload(&mut request).await.unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert_eq!(
        err.validation(),
        Some(&json!({ "source": "payload", "keys": ["name"] }))
    );
    assert_eq!(err.output.payload["message"], "\"name\" is required");

    let events = logger.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tags, vec!["validation", "error", "payload"]);
    assert_eq!(events[0].data["output"]["statusCode"], 400);
}

#[tokio::test]
async fn orig_is_captured_once_before_coercion() {
    let schema = Rule::object_of([("limit", Rule::number())]);
    let (request, _) = request_for(ValidatePolicy::default().with_schema(Source::Query, schema));
    let mut request = request.with_bucket(Source::Query, json!({ "limit": "25" }));

    assert_eq!(query(&mut request).await, Ok(Next::Continue));
    assert_eq!(request.query, json!({ "limit": 25 }));
    assert_eq!(request.orig.get(Source::Query), Some(&json!({ "limit": "25" })));

    request.query = json!({ "limit": "50" });
    assert_eq!(query(&mut request).await, Ok(Next::Continue));
    assert_eq!(request.query, json!({ "limit": 50 }));
    assert_eq!(request.orig.get(Source::Query), Some(&json!({ "limit": "25" })));
}

#[tokio::test]
async fn ignore_never_surfaces_or_logs() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Payload, name_required())
        .with_fail_action(FailAction::Ignore);
    let (request, logger) = request_for(policy);
    let mut request = request.with_bucket(Source::Payload, json!({ "other": 1 }));

    assert_eq!(payload(&mut request).await, Ok(Next::Continue));
    assert!(logger.is_empty());
    assert_eq!(request.payload, json!({ "other": 1 }));
    assert_eq!(request.orig.get(Source::Payload), Some(&json!({ "other": 1 })));
}

#[tokio::test]
async fn ignore_keeps_partial_coercion() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Query, Rule::object_of([("page", Rule::number())]))
        .with_fail_action(FailAction::Ignore);
    let (request, logger) = request_for(policy);
    let mut request = request.with_bucket(Source::Query, json!({ "page": "2", "bad": true }));

    assert_eq!(query(&mut request).await, Ok(Next::Continue));
    assert!(logger.is_empty());
    assert_eq!(request.query, json!({ "page": 2, "bad": true }));
    assert_eq!(
        request.orig.get(Source::Query),
        Some(&json!({ "page": "2", "bad": true }))
    );
}

#[tokio::test]
async fn log_continues_with_exactly_one_event() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Payload, name_required())
        .with_fail_action(FailAction::Log);
    let (request, logger) = request_for(policy);
    let mut request = request.with_bucket(Source::Payload, json!({}));

    assert_eq!(payload(&mut request).await, Ok(Next::Continue));
    assert_eq!(logger.len(), 1);
}

#[tokio::test]
async fn error_fields_are_merged_into_payload() {
    let mut policy = ValidatePolicy::default().with_schema(Source::Payload, name_required());
    policy
        .error_fields
        .insert("docs".into(), json!("https://example.com/errors"));
    let (request, _) = request_for(policy);
    let mut request = request.with_bucket(Source::Payload, json!({}));

    let err = payload(&mut request).await.unwrap_err();
    assert_eq!(err.output.payload["docs"], "https://example.com/errors");
    assert_eq!(err.output.payload["validation"]["source"], "payload");
}

#[tokio::test]
async fn custom_handler_can_take_over() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Payload, name_required())
        .with_fail_action(FailAction::from_fn(
            |_request: &mut Request, reply: Reply, source: Source, error: HttpError| {
                assert_eq!(reply.source(), source);
                reply.response(202, json!({ "accepted": false, "keys": error.validation() }))
            },
        ));
    let (request, logger) = request_for(policy);
    let mut request = request.with_bucket(Source::Payload, json!({}));

    let next = payload(&mut request).await.expect("handler took over");
    let Next::Respond(response) = next else {
        panic!("expected a takeover response");
    };
    assert_eq!(response.status_code(), 202);
    assert_eq!(response.body()["accepted"], false);
    assert_eq!(logger.len(), 1);
}

#[tokio::test]
async fn custom_handler_can_abort_with_its_own_error() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Params, name_required())
        .with_fail_action(FailAction::from_fn(
            |_request: &mut Request, reply: Reply, _source: Source, _error: HttpError| {
                reply.error(HttpError::unsupported_media_type("nope"))
            },
        ));
    let (request, _) = request_for(policy);
    let mut request = request.with_bucket(Source::Params, json!({}));

    let err = params(&mut request).await.unwrap_err();
    assert_eq!(err.status_code(), 415);
}

struct Patch;

impl FailHandler for Patch {
    fn handle<'a>(
        &'a self,
        request: &'a mut Request,
        reply: Reply,
        source: Source,
        _error: HttpError,
    ) -> BoxFuture<'a, Decision> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            *request.bucket_mut(source) = json!({ "name": "anonymous" });
            reply.proceed()
        })
    }
}

#[tokio::test]
async fn async_handler_may_repair_the_request() {
    let policy = ValidatePolicy::default()
        .with_schema(Source::Payload, name_required())
        .with_fail_action(FailAction::custom(Patch));
    let (request, _) = request_for(policy);
    let mut request = request.with_bucket(Source::Payload, json!({}));

    assert_eq!(payload(&mut request).await, Ok(Next::Continue));
    assert_eq!(request.payload, json!({ "name": "anonymous" }));
    assert_eq!(request.orig.get(Source::Payload), Some(&json!({})));
}

#[tokio::test]
async fn dynamic_schema_may_await_and_coerce() {
    let schema = Schema::dynamic(|value: Value, _options| async move {
        tokio::task::yield_now().await;
        match value.get("id").and_then(Value::as_str) {
            Some(id) => Ok(Some(json!({ "id": id.to_uppercase() }))),
            None => Err(ValidationError::root("\"value\" needs an id")),
        }
    });
    let (request, _) = request_for(ValidatePolicy::default().with_schema(Source::Params, schema));
    let mut request = request.with_bucket(Source::Params, json!({ "id": "abc" }));

    assert_eq!(params(&mut request).await, Ok(Next::Continue));
    assert_eq!(request.params, json!({ "id": "ABC" }));
}

#[tokio::test]
async fn context_reference_checks_sibling_bucket() {
    let schema = Rule::object_of([(
        "owner",
        Rule::string().valid_ref(routeguard_schema::Reference::context("params.user")),
    )]);
    let (request, _) = request_for(ValidatePolicy::default().with_schema(Source::Payload, schema));
    let mut request = request
        .with_bucket(Source::Params, json!({ "user": "ada" }))
        .with_bucket(Source::Payload, json!({ "owner": "bob" }));

    let err = validate_input(Source::Payload, &mut request).await.unwrap_err();
    assert_eq!(err.validation().map(|v| v["keys"].clone()), Some(json!(["owner"])));

    request.payload = json!({ "owner": "ada" });
    assert_eq!(payload(&mut request).await, Ok(Next::Continue));
}

#[tokio::test]
async fn policy_from_route_config() {
    let handlers = Handlers::new()
        .schema(
            "anyParams",
            DynamicSchema::new(|_value: Value, _options| async { Ok(None) }),
        )
        .fail_fn(
            "teapot",
            |_request: &mut Request, reply: Reply, _source: Source, _error: HttpError| {
                reply.response(418, json!({ "teapot": true }))
            },
        );
    let config = json!({
        "validate": {
            "params": func_ref("anyParams"),
            "payload": {
                "type": "object",
                "properties": { "count": { "type": "integer" } },
                "required": ["count"]
            },
            "failAction": func_ref("teapot")
        }
    });
    let route = RoutePolicy::from_config(&config, &handlers, &JsonSchemaConfig::default())
        .expect("route config should build");
    let mut request = Request::new(Arc::new(route)).with_bucket(Source::Payload, json!({}));

    assert_eq!(params(&mut request).await, Ok(Next::Continue));
    let next = payload(&mut request).await.expect("handler took over");
    assert_eq!(next, Next::Respond(Response::plain(418, json!({ "teapot": true }))));
}

#[tokio::test]
async fn json_schema_required_reports_the_missing_key() {
    let config = json!({
        "validate": {
            "payload": {
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"]
            }
        }
    });
    let route = RoutePolicy::from_config(&config, &Handlers::new(), &JsonSchemaConfig::default())
        .expect("route config should build");
    let mut request = Request::new(Arc::new(route)).with_bucket(Source::Payload, json!({}));

    let err = payload(&mut request).await.unwrap_err();
    assert_eq!(
        err.validation(),
        Some(&json!({ "source": "payload", "keys": ["name"] }))
    );
    assert_eq!(err.output.payload["message"], "\"name\" is required");
}

fn strict_query_route() -> RoutePolicy {
    let config = json!({
        "validate": {
            "query": {
                "type": "object",
                "properties": { "page": { "type": "integer" } }
            }
        }
    });
    let json = JsonSchemaConfig {
        strict_mode: true,
        ..JsonSchemaConfig::default()
    };
    RoutePolicy::from_config(&config, &Handlers::new(), &json).expect("route config should build")
}

#[tokio::test]
async fn strict_json_schema_names_unknown_keys() {
    let mut request = Request::new(Arc::new(strict_query_route()))
        .with_bucket(Source::Query, json!({ "page": "2", "extra": 1 }));

    let err = query(&mut request).await.unwrap_err();
    assert_eq!(
        err.validation(),
        Some(&json!({ "source": "query", "keys": ["extra"] }))
    );
}

#[tokio::test]
async fn json_schema_honors_connection_options() {
    let settings = ConnectionSettings {
        validation: Some(ValidationOptions {
            allow_unknown: true,
            ..ValidationOptions::default()
        }),
    };
    let mut request = Request::new(Arc::new(strict_query_route()))
        .with_connection(Arc::new(settings))
        .with_bucket(Source::Query, json!({ "page": "2", "extra": 1 }));

    assert_eq!(query(&mut request).await, Ok(Next::Continue));
    assert_eq!(request.query, json!({ "page": 2, "extra": 1 }));
    assert_eq!(
        request.orig.get(Source::Query),
        Some(&json!({ "page": "2", "extra": 1 }))
    );
}
