//! Typed per-route validation policy.
//!
//! Policies are built from a route configuration object after it passes the
//! `routeConfig` catalog rule, so structural invariants (at least one input
//! source, `schema` or `status` on responses, `modify` excluding `sample`)
//! already hold by the time a [`RoutePolicy`] exists.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use routeguard_schema::{
    assert, func_ref_name, DynamicSchema, JsonSchema, JsonSchemaConfig, Rule, Schema, SchemaKind,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{HttpError, PolicyError, Result};
use crate::reply::{Decision, FailHandler, Reply};
use crate::request::{Request, Source};

/// Reaction to an input validation failure.
#[derive(Clone, Default)]
pub enum FailAction {
    #[default]
    Error,
    Log,
    Ignore,
    Custom(Arc<dyn FailHandler>),
}

impl FailAction {
    pub fn custom(handler: impl FailHandler + 'static) -> Self {
        FailAction::Custom(Arc::new(handler))
    }

    /// Synchronous handler from a closure.
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&mut Request, Reply, Source, HttpError) -> Decision + Send + Sync + 'static,
    {
        FailAction::Custom(Arc::new(handler))
    }

    fn from_config(value: Option<&Value>, handlers: &Handlers) -> Result<Self> {
        let Some(value) = value else {
            return Ok(FailAction::Error);
        };
        if let Some(name) = func_ref_name(value) {
            return handlers
                .fail_handlers
                .get(name)
                .cloned()
                .map(FailAction::Custom)
                .ok_or_else(|| PolicyError::UnknownHandler(name.to_string()));
        }
        Ok(match value.as_str() {
            Some("log") => FailAction::Log,
            Some("ignore") => FailAction::Ignore,
            _ => FailAction::Error,
        })
    }
}

impl fmt::Debug for FailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailAction::Error => f.write_str("Error"),
            FailAction::Log => f.write_str("Log"),
            FailAction::Ignore => f.write_str("Ignore"),
            FailAction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Response failures can be logged or escalated, never handed to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFailAction {
    #[default]
    Error,
    Log,
}

#[derive(Debug, Clone, Default)]
pub struct ValidatePolicy {
    pub headers: Option<Schema>,
    pub params: Option<Schema>,
    pub query: Option<Schema>,
    pub payload: Option<Schema>,
    pub fail_action: FailAction,
    /// Extra fields merged into every 400 payload.
    pub error_fields: Map<String, Value>,
}

impl ValidatePolicy {
    pub fn schema(&self, source: Source) -> Option<&Schema> {
        match source {
            Source::Headers => self.headers.as_ref(),
            Source::Params => self.params.as_ref(),
            Source::Query => self.query.as_ref(),
            Source::Payload => self.payload.as_ref(),
        }
    }

    pub fn with_schema(mut self, source: Source, schema: impl Into<Schema>) -> Self {
        let slot = match source {
            Source::Headers => &mut self.headers,
            Source::Params => &mut self.params,
            Source::Query => &mut self.query,
            Source::Payload => &mut self.payload,
        };
        *slot = Some(schema.into());
        self
    }

    pub fn with_fail_action(mut self, fail_action: FailAction) -> Self {
        self.fail_action = fail_action;
        self
    }

    fn from_config(config: &Value, handlers: &Handlers, json: &JsonSchemaConfig) -> Result<Self> {
        Ok(Self {
            headers: compile_slot(config.get("headers"), handlers, json)?,
            params: compile_slot(config.get("params"), handlers, json)?,
            query: compile_slot(config.get("query"), handlers, json)?,
            payload: compile_slot(config.get("payload"), handlers, json)?,
            fail_action: FailAction::from_config(config.get("failAction"), handlers)?,
            error_fields: config
                .get("errorFields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponsePolicy {
    /// Schema for any status without its own entry.
    pub schema: Option<Schema>,
    pub status: BTreeMap<u16, Schema>,
    /// Percentage of responses to validate.
    pub sample: Option<u8>,
    pub fail_action: ResponseFailAction,
    /// Replace the response body with the coerced value.
    pub modify: bool,
}

impl ResponsePolicy {
    fn from_config(config: &Value, handlers: &Handlers, json: &JsonSchemaConfig) -> Result<Self> {
        let mut status = BTreeMap::new();
        if let Some(entries) = config.get("status").and_then(Value::as_object) {
            for (code, slot) in entries {
                let parsed = code
                    .parse::<u16>()
                    .ok()
                    .filter(|status| (100..=599).contains(status))
                    .ok_or_else(|| PolicyError::InvalidStatus(code.clone()))?;
                if let Some(schema) = compile_slot(Some(slot), handlers, json)? {
                    status.insert(parsed, schema);
                }
            }
        }

        Ok(Self {
            schema: compile_slot(config.get("schema"), handlers, json)?,
            status,
            // fractional percentages round down
            sample: config
                .get("sample")
                .and_then(Value::as_f64)
                .map(|sample| sample.floor() as u8),
            fail_action: match config.get("failAction").and_then(Value::as_str) {
                Some("log") => ResponseFailAction::Log,
                _ => ResponseFailAction::Error,
            },
            modify: config
                .get("modify")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    pub validate: ValidatePolicy,
    pub response: Option<ResponsePolicy>,
}

impl RoutePolicy {
    /// Build a policy from a route configuration object.
    ///
    /// The object is checked against the `routeConfig` catalog rule first.
    /// Schema slots: `null` or `true` skip validation, `false` accepts only
    /// an empty object or null, an object is compiled as a JSON Schema
    /// document and `{"$fn": name}` is looked up in `handlers`.
    pub fn from_config(
        config: &Value,
        handlers: &Handlers,
        json: &JsonSchemaConfig,
    ) -> Result<Self> {
        let config = assert(SchemaKind::RouteConfig, config, None)?;

        let validate = match config.get("validate") {
            Some(validate) => ValidatePolicy::from_config(validate, handlers, json)?,
            None => ValidatePolicy::default(),
        };
        let response = config
            .get("response")
            .map(|response| ResponsePolicy::from_config(response, handlers, json))
            .transpose()?;

        debug!(
            sources = Source::ALL
                .into_iter()
                .filter(|source| validate.schema(*source).is_some())
                .count(),
            response = response.is_some(),
            "route policy built"
        );
        Ok(Self { validate, response })
    }
}

fn compile_slot(
    slot: Option<&Value>,
    handlers: &Handlers,
    json: &JsonSchemaConfig,
) -> Result<Option<Schema>> {
    match slot {
        None | Some(Value::Null) | Some(Value::Bool(true)) => Ok(None),
        Some(Value::Bool(false)) => Ok(Some(Rule::empty_object().allow_null().into())),
        Some(value) => match func_ref_name(value) {
            Some(name) => handlers
                .schemas
                .get(name)
                .cloned()
                .map(|schema| Some(Schema::Dynamic(schema)))
                .ok_or_else(|| PolicyError::UnknownHandler(name.to_string())),
            None => Ok(Some(Schema::from_evaluator(JsonSchema::compile_with(
                value, json,
            )?))),
        },
    }
}

/// Callables that `{"$fn": name}` references in a route configuration
/// resolve to.
#[derive(Clone, Default)]
pub struct Handlers {
    schemas: HashMap<String, DynamicSchema>,
    fail_handlers: HashMap<String, Arc<dyn FailHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, name: impl Into<String>, schema: DynamicSchema) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    pub fn fail_handler(mut self, name: impl Into<String>, handler: impl FailHandler + 'static) -> Self {
        self.fail_handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a synchronous fail handler closure.
    pub fn fail_fn<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Request, Reply, Source, HttpError) -> Decision + Send + Sync + 'static,
    {
        self.fail_handler(name, handler)
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemas: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        schemas.sort_unstable();
        let mut fail_handlers: Vec<&str> = self.fail_handlers.keys().map(String::as_str).collect();
        fail_handlers.sort_unstable();
        f.debug_struct("Handlers")
            .field("schemas", &schemas)
            .field("fail_handlers", &fail_handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use routeguard_schema::{func_ref, ValidationError};
    use serde_json::json;

    use super::*;

    fn build(config: Value) -> Result<RoutePolicy> {
        RoutePolicy::from_config(&config, &Handlers::new(), &JsonSchemaConfig::default())
    }

    #[test]
    fn slots_map_to_schemas() {
        let policy = build(json!({
            "validate": {
                "headers": true,
                "params": null,
                "query": false,
                "payload": { "type": "object" },
                "failAction": "log",
                "errorFields": { "docs": "/help" }
            }
        }))
        .expect("policy should build");

        assert!(policy.validate.headers.is_none());
        assert!(policy.validate.params.is_none());
        assert!(policy.validate.query.is_some());
        assert!(policy.validate.payload.is_some());
        assert!(matches!(policy.validate.fail_action, FailAction::Log));
        assert_eq!(policy.validate.error_fields["docs"], "/help");
        assert!(policy.response.is_none());
    }

    #[test]
    fn response_block() {
        let policy = build(json!({
            "response": {
                "schema": { "type": "object" },
                "status": { "201": true, "404": { "type": "object" } },
                "sample": 12.5,
                "failAction": "log"
            }
        }))
        .expect("policy should build");

        let response = policy.response.expect("response policy");
        assert!(response.schema.is_some());
        assert_eq!(response.status.keys().copied().collect::<Vec<_>>(), vec![404]);
        assert_eq!(response.sample, Some(12));
        assert_eq!(response.fail_action, ResponseFailAction::Log);
        assert!(!response.modify);
    }

    #[test]
    fn invalid_config_is_rejected_before_building() {
        let err = build(json!({ "response": { "schema": {}, "modify": true, "sample": 5 } }))
            .unwrap_err();
        match err {
            PolicyError::Config(config) => assert_eq!(config.keys(), vec!["response.modify"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn function_references_resolve_through_handlers() {
        let handlers = Handlers::new()
            .schema(
                "checkId",
                DynamicSchema::new(|_value: Value, _options| async {
                    Err(ValidationError::root("\"value\" rejected"))
                }),
            )
            .fail_fn("recover", |_request: &mut Request, reply: Reply, _source: Source, _error: HttpError| {
                reply.proceed()
            });
        let config = json!({
            "validate": { "params": func_ref("checkId"), "failAction": func_ref("recover") }
        });

        let policy = RoutePolicy::from_config(&config, &handlers, &JsonSchemaConfig::default())
            .expect("policy should build");
        assert!(policy.validate.params.as_ref().is_some_and(Schema::is_dynamic));
        assert!(matches!(policy.validate.fail_action, FailAction::Custom(_)));

        let missing = RoutePolicy::from_config(&config, &Handlers::new(), &JsonSchemaConfig::default())
            .unwrap_err();
        assert!(matches!(missing, PolicyError::UnknownHandler(name) if name == "checkId"));
    }

    #[test]
    fn status_outside_http_range_is_rejected() {
        let err = build(json!({ "response": { "status": { "999": true } } })).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidStatus(code) if code == "999"));

        let policy = build(json!({ "response": { "status": { "599": { "type": "object" } } } }))
            .expect("policy should build");
        assert!(policy.response.is_some_and(|response| response.status.contains_key(&599)));
    }

    #[test]
    fn broken_json_schema_is_reported() {
        let err = build(json!({ "validate": { "query": { "type": "nope" } } })).unwrap_err();
        assert!(matches!(err, PolicyError::Schema(_)));
    }
}
