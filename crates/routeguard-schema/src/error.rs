use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::registry::SchemaKind;

/// Placeholder rendered by [`ValidationError::annotate`] for required keys
/// that were absent from the input.
const MISSING: &str = "--missing--";

/// One violated constraint: where it happened and what was expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detail {
    /// Dotted path of the offending value (`cache.expiresIn`, `pre.0`).
    /// Root-level violations use `value`.
    pub path: String,
    /// Human-readable message, prefixed with the quoted key label.
    pub message: String,
}

impl Detail {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A value failed its schema. Details keep evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    pub details: Vec<Detail>,
    /// The input with whatever coercion succeeded before the failure, when
    /// the engine produced one.
    pub value: Option<Value>,
}

impl ValidationError {
    /// Build an error whose message joins every detail message.
    pub fn new(details: Vec<Detail>) -> Self {
        let message = details
            .iter()
            .map(|detail| detail.message.as_str())
            .collect::<Vec<_>>()
            .join(". ");
        Self {
            message,
            details,
            value: None,
        }
    }

    /// Attach the partially coerced input.
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    /// Single-detail error at the root of the value.
    pub fn root(message: impl Into<String>) -> Self {
        Self::new(vec![Detail::new("value", message)])
    }

    /// Violated paths, in evaluation order.
    pub fn keys(&self) -> Vec<String> {
        self.details.iter().map(|d| d.path.clone()).collect()
    }

    /// Render `value` with each offending key tagged `[n]`, followed by the
    /// numbered messages.
    pub fn annotate(&self, value: &Value) -> String {
        let mut annotated = value.clone();
        for (index, detail) in self.details.iter().enumerate() {
            mark_path(&mut annotated, &detail.path, index + 1);
        }

        let mut out = serde_json::to_string_pretty(&annotated).unwrap_or_else(|_| "{}".into());
        out.push('\n');
        for (index, detail) in self.details.iter().enumerate() {
            let _ = write!(out, "\n[{}] {}", index + 1, detail.message);
        }
        out
    }
}

fn mark_path(root: &mut Value, path: &str, marker: usize) {
    if path == "value" || path.is_empty() {
        return;
    }

    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut cursor = root;
    for segment in parents {
        let next = match cursor {
            Value::Object(map) => map.get_mut(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(value) => cursor = value,
            None => return,
        }
    }

    if let Value::Object(map) = cursor {
        let value = map
            .remove(*last)
            .unwrap_or_else(|| Value::String(MISSING.to_string()));
        map.insert(format!("{last} [{marker}]"), value);
    }
}

/// Errors raised while preparing schemas (not while applying them).
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A JSON Schema document could not be compiled.
    #[error("failed to compile schema: {0}")]
    CompileFailed(String),

    /// A schema document exceeds the configured size budget.
    #[error("schema too large ({size} bytes, max {max})")]
    TooLarge { size: usize, max: usize },

    /// No catalog entry with this name.
    #[error("unknown schema kind '{0}'")]
    UnknownKind(String),

    /// Serialization failure while sizing or loading a schema.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// A framework configuration object violated its catalog schema.
///
/// Always fatal: the object must not be used.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {kind} options{} {annotation}", context_label(.context))]
    Invalid {
        kind: SchemaKind,
        context: Option<String>,
        annotation: String,
        details: Vec<Detail>,
    },
}

impl ConfigError {
    pub fn kind(&self) -> SchemaKind {
        match self {
            ConfigError::Invalid { kind, .. } => *kind,
        }
    }

    pub fn details(&self) -> &[Detail] {
        match self {
            ConfigError::Invalid { details, .. } => details,
        }
    }

    /// Violated paths, in evaluation order.
    pub fn keys(&self) -> Vec<String> {
        self.details().iter().map(|d| d.path.clone()).collect()
    }
}

fn context_label(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" ({context})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_joins_details_in_order() {
        let err = ValidationError::new(vec![
            Detail::new("a", "\"a\" is required"),
            Detail::new("b", "\"b\" must be a number"),
        ]);
        assert_eq!(err.message, "\"a\" is required. \"b\" must be a number");
        assert_eq!(err.keys(), vec!["a", "b"]);
        assert_eq!(err.value, None);
    }

    #[test]
    fn annotate_marks_present_and_missing_keys() {
        let value = json!({ "cache": { "expiresIn": 1000 } });
        let err = ValidationError::new(vec![
            Detail::new("cache.expiresIn", "\"expiresIn\" must be a string"),
            Detail::new("path", "\"path\" is required"),
        ]);

        let text = err.annotate(&value);
        assert!(text.contains("\"expiresIn [1]\": 1000"));
        assert!(text.contains("\"path [2]\": \"--missing--\""));
        assert!(text.ends_with("[2] \"path\" is required"));
    }

    #[test]
    fn config_error_display_carries_kind_and_context() {
        let err = ConfigError::Invalid {
            kind: SchemaKind::RouteConfig,
            context: Some("/users".into()),
            annotation: "{}".into(),
            details: vec![Detail::new("cache", "conflict")],
        };
        assert_eq!(err.to_string(), "Invalid routeConfig options (/users) {}");
        assert_eq!(err.keys(), vec!["cache"]);
    }
}
