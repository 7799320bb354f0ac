use routeguard_schema::{ConfigError, Detail, SchemaError};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Status code and body sent to the client for an [`HttpError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub status_code: u16,
    pub payload: Value,
}

/// HTTP-facing error produced by request and response validation.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct HttpError {
    /// Full message; may differ from the one exposed in `output.payload`.
    pub message: String,
    pub output: ErrorOutput,
    pub details: Vec<Detail>,
    /// Set for failures caused by the server rather than the client.
    pub is_developer_error: bool,
}

impl HttpError {
    fn new(status_code: u16, reason: &str, message: String, exposed: &str) -> Self {
        Self {
            output: ErrorOutput {
                status_code,
                payload: json!({
                    "statusCode": status_code,
                    "error": reason,
                    "message": exposed,
                }),
            },
            message,
            details: Vec::new(),
            is_developer_error: false,
        }
    }

    /// 400.
    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        let exposed = message.clone();
        Self::new(400, "Bad Request", message, &exposed)
    }

    /// 415.
    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        let message = message.into();
        let exposed = message.clone();
        Self::new(415, "Unsupported Media Type", message, &exposed)
    }

    /// 500. The message stays server-side; clients see a generic one.
    pub fn bad_implementation(message: impl Into<String>) -> Self {
        let mut error = Self::new(
            500,
            "Internal Server Error",
            message.into(),
            "An internal server error occurred",
        );
        error.is_developer_error = true;
        error
    }

    pub fn with_details(mut self, details: Vec<Detail>) -> Self {
        self.details = details;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.output.status_code
    }

    /// Record which request source failed and the violated paths.
    pub fn set_validation(&mut self, source: &str, keys: Vec<String>) {
        if let Value::Object(payload) = &mut self.output.payload {
            payload.insert(
                "validation".to_string(),
                json!({ "source": source, "keys": keys }),
            );
        }
    }

    /// The `{source, keys}` block set by [`HttpError::set_validation`].
    pub fn validation(&self) -> Option<&Value> {
        self.output.payload.get("validation")
    }

    /// Copy route-defined fields into the payload, replacing existing ones.
    pub fn merge_fields(&mut self, fields: &Map<String, Value>) {
        if let Value::Object(payload) = &mut self.output.payload {
            for (key, value) in fields {
                payload.insert(key.clone(), value.clone());
            }
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Errors raised while turning a route configuration into a policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The route configuration failed its catalog schema.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A schema document in the configuration could not be compiled.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A `{"$fn": name}` reference names nothing in the handler table.
    #[error("no handler registered as '{0}'")]
    UnknownHandler(String),

    /// A response `status` key is outside the HTTP status range 100-599.
    #[error("invalid status code '{0}'")]
    InvalidStatus(String),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
