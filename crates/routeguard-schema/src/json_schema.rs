use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::config::JsonSchemaConfig;
use crate::engine::{Evaluate, Outcome};
use crate::error::{Detail, Result, SchemaError, ValidationError};
use crate::options::ValidationOptions;

/// A compiled JSON Schema document used as a validation engine.
///
/// Options map onto the document as follows:
///
/// - `convert` turns strings into the integer, number or boolean a
///   property's `type` asks for, and fills missing properties that declare a
///   `default`;
/// - `allow_unknown` lifts every `additionalProperties: false`, including
///   the ones strict mode adds;
/// - `strip_unknown` drops the undeclared properties instead of rejecting
///   them;
/// - `context` is not visible to JSON Schema documents. Cross-bucket checks
///   need a [`Rule`](crate::Rule) with a context reference or a dynamic
///   schema.
pub struct JsonSchema {
    document: Value,
    validator: Validator,
}

impl JsonSchema {
    pub fn compile(schema: &Value) -> Result<Self> {
        Self::compile_with(schema, &JsonSchemaConfig::default())
    }

    pub fn compile_with(schema: &Value, config: &JsonSchemaConfig) -> Result<Self> {
        let size = serde_json::to_vec(schema)?.len();
        if size > config.max_schema_size {
            return Err(SchemaError::TooLarge {
                size,
                max: config.max_schema_size,
            });
        }

        let mut document = schema.clone();
        if config.strict_mode {
            apply_strict_mode(&mut document);
        }

        let validator = jsonschema::validator_for(&document)
            .map_err(|err| SchemaError::CompileFailed(err.to_string()))?;
        Ok(Self {
            document,
            validator,
        })
    }

    /// Parse then compile a schema document.
    pub fn parse(schema_json: &str, config: &JsonSchemaConfig) -> Result<Self> {
        let schema: Value = serde_json::from_str(schema_json)?;
        Self::compile_with(&schema, config)
    }
}

impl Evaluate for JsonSchema {
    fn evaluate(&self, value: &Value, options: &ValidationOptions) -> Outcome {
        let mut candidate = value.clone();
        let mut changed = options.convert && coerce(&self.document, &mut candidate);

        let mut details = Vec::new();
        let mut undeclared = Vec::new();
        for err in self.validator.iter_errors(&candidate) {
            if let ValidationErrorKind::AdditionalProperties { unexpected } = &err.kind {
                if options.allow_unknown {
                    continue;
                }
                if options.strip_unknown {
                    undeclared.push((err.instance_path.to_string(), unexpected.clone()));
                    continue;
                }
            }
            details.extend(describe(&err));
            if options.abort_early {
                details.truncate(1);
                break;
            }
        }

        for (pointer, keys) in undeclared {
            if let Some(Value::Object(map)) = candidate.pointer_mut(&pointer) {
                for key in keys {
                    if map.remove(&key).is_some() {
                        debug!(key = %key, "stripping undeclared property");
                        changed = true;
                    }
                }
            }
        }

        let coerced = changed.then_some(candidate);
        if details.is_empty() {
            Ok(coerced)
        } else {
            Err(ValidationError::new(details).with_value(coerced))
        }
    }
}

/// Required and undeclared properties are reported on the property itself,
/// not on the object that holds it.
fn describe(err: &jsonschema::ValidationError<'_>) -> Vec<Detail> {
    let parent = segments(&err.instance_path.to_string());
    match &err.kind {
        ValidationErrorKind::Required { property } => {
            let key = property
                .as_str()
                .map_or_else(|| property.to_string(), str::to_string);
            vec![Detail::new(
                join_path(&parent, Some(key.as_str())),
                format!("\"{key}\" is required"),
            )]
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => unexpected
            .iter()
            .map(|key| {
                Detail::new(
                    join_path(&parent, Some(key.as_str())),
                    format!("\"{key}\" is not allowed"),
                )
            })
            .collect(),
        _ => {
            let label = parent.last().map(String::as_str).unwrap_or("value");
            vec![Detail::new(
                join_path(&parent, None),
                format!("\"{label}\" {err}"),
            )]
        }
    }
}

/// `/pre/0/method` becomes `["pre", "0", "method"]`.
fn segments(pointer: &str) -> Vec<String> {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Dotted path; the root becomes `value`.
fn join_path(parent: &[String], key: Option<&str>) -> String {
    let mut parts: Vec<&str> = parent.iter().map(String::as_str).collect();
    parts.extend(key);
    if parts.is_empty() {
        "value".to_string()
    } else {
        parts.join(".")
    }
}

/// Apply `type`-directed string coercion and `default` filling in place.
fn coerce(schema: &Value, value: &mut Value) -> bool {
    let Value::Object(schema) = schema else {
        return false;
    };

    match value {
        Value::String(text) => match coerce_scalar(schema.get("type"), text) {
            Some(coerced) => {
                *value = coerced;
                true
            }
            None => false,
        },
        Value::Object(map) => {
            let Some(Value::Object(properties)) = schema.get("properties") else {
                return false;
            };
            let mut changed = false;
            for (key, property) in properties {
                if let Some(child) = map.get_mut(key) {
                    changed |= coerce(property, child);
                } else if let Some(default) = property.get("default") {
                    map.insert(key.clone(), default.clone());
                    changed = true;
                }
            }
            changed
        }
        Value::Array(items) => match schema.get("items") {
            Some(item_schema @ Value::Object(_)) => items
                .iter_mut()
                .fold(false, |changed, item| coerce(item_schema, item) | changed),
            _ => false,
        },
        _ => false,
    }
}

fn coerce_scalar(declared: Option<&Value>, text: &str) -> Option<Value> {
    let types: Vec<&str> = match declared? {
        Value::String(kind) => vec![kind.as_str()],
        Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => return None,
    };
    if types.contains(&"string") {
        return None;
    }

    types.into_iter().find_map(|kind| match kind {
        "integer" => text.trim().parse::<i64>().ok().map(Value::from),
        "number" => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .and_then(|number| {
                if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
                    Some(Value::from(number as i64))
                } else {
                    Number::from_f64(number).map(Value::Number)
                }
            }),
        "boolean" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    })
}

fn apply_strict_mode(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if is_object_schema(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for key in ["properties", "patternProperties", "$defs", "definitions"] {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    children.values_mut().for_each(apply_strict_mode);
                }
            }
            for key in ["items", "additionalProperties", "not", "if", "then", "else"] {
                if let Some(child) = map.get_mut(key) {
                    apply_strict_mode(child);
                }
            }
            for key in ["prefixItems", "allOf", "anyOf", "oneOf"] {
                if let Some(Value::Array(children)) = map.get_mut(key) {
                    children.iter_mut().for_each(apply_strict_mode);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(apply_strict_mode),
        _ => {}
    }
}

fn is_object_schema(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("object")),
        _ => ["properties", "patternProperties", "required"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["id"]
        })
    }

    #[test]
    fn passing_value_is_left_unchanged() {
        let schema = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let outcome = schema.evaluate(&json!({ "id": 1 }), &ValidationOptions::default());
        assert_eq!(outcome, Ok(None));
    }

    #[test]
    fn violations_use_dotted_paths() {
        let schema = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let err = schema
            .evaluate(&json!({ "id": "x", "tags": ["a", 2] }), &ValidationOptions::default())
            .unwrap_err();
        let mut keys = err.keys();
        keys.sort();
        assert_eq!(keys, vec!["id", "tags.1"]);

        let missing = schema
            .evaluate(&json!({}), &ValidationOptions::default())
            .unwrap_err();
        assert_eq!(missing.keys(), vec!["id"]);
        assert_eq!(missing.message, "\"id\" is required");
    }

    #[test]
    fn converts_strings_to_declared_types() {
        let schema = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let outcome = schema.evaluate(&json!({ "id": "42", "tags": ["a"] }), &ValidationOptions::default());
        assert_eq!(outcome, Ok(Some(json!({ "id": 42, "tags": ["a"] }))));

        let exact = ValidationOptions {
            convert: false,
            ..ValidationOptions::default()
        };
        let err = schema.evaluate(&json!({ "id": "42" }), &exact).unwrap_err();
        assert_eq!(err.keys(), vec!["id"]);
        assert_eq!(err.value, None);
    }

    #[test]
    fn fills_declared_defaults() {
        let schema = JsonSchema::compile(&json!({
            "type": "object",
            "properties": {
                "page": { "type": "integer", "default": 1 },
                "verbose": { "type": "boolean" }
            }
        }))
        .expect("schema should compile");

        let outcome = schema.evaluate(&json!({ "verbose": "true" }), &ValidationOptions::default());
        assert_eq!(outcome, Ok(Some(json!({ "page": 1, "verbose": true }))));
    }

    #[test]
    fn undeclared_properties_follow_options() {
        let config = JsonSchemaConfig {
            strict_mode: true,
            ..JsonSchemaConfig::default()
        };
        let schema = JsonSchema::compile_with(&user_schema(), &config).expect("schema should compile");
        let value = json!({ "id": 1, "extra": true });

        let err = schema.evaluate(&value, &ValidationOptions::default()).unwrap_err();
        assert_eq!(err.keys(), vec!["extra"]);
        assert_eq!(err.message, "\"extra\" is not allowed");

        let allow = ValidationOptions {
            allow_unknown: true,
            ..ValidationOptions::default()
        };
        assert_eq!(schema.evaluate(&value, &allow), Ok(None));

        let strip = ValidationOptions {
            strip_unknown: true,
            ..ValidationOptions::default()
        };
        assert_eq!(schema.evaluate(&value, &strip), Ok(Some(json!({ "id": 1 }))));
    }

    #[test]
    fn failure_keeps_partial_coercion() {
        let schema = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let err = schema
            .evaluate(&json!({ "id": "7", "tags": [1] }), &ValidationOptions::default())
            .unwrap_err();
        assert_eq!(err.keys(), vec!["tags.0"]);
        assert_eq!(err.value, Some(json!({ "id": 7, "tags": [1] })));
    }

    #[test]
    fn abort_early_reports_one_violation() {
        let schema = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let options = ValidationOptions {
            abort_early: true,
            ..ValidationOptions::default()
        };
        let err = schema
            .evaluate(&json!({ "id": "x", "tags": [1] }), &options)
            .unwrap_err();
        assert_eq!(err.details.len(), 1);
    }

    #[test]
    fn strict_mode_rejects_undeclared_properties() {
        let config = JsonSchemaConfig {
            strict_mode: true,
            ..JsonSchemaConfig::default()
        };
        let strict = JsonSchema::compile_with(&user_schema(), &config).expect("schema should compile");
        let lenient = JsonSchema::compile(&user_schema()).expect("schema should compile");
        let value = json!({ "id": 1, "extra": true });

        assert!(strict.evaluate(&value, &ValidationOptions::default()).is_err());
        assert!(lenient.evaluate(&value, &ValidationOptions::default()).is_ok());
    }

    #[test]
    fn oversized_and_broken_schemas_are_rejected() {
        let config = JsonSchemaConfig {
            max_schema_size: 8,
            ..JsonSchemaConfig::default()
        };
        assert!(matches!(
            JsonSchema::compile_with(&user_schema(), &config),
            Err(SchemaError::TooLarge { max: 8, .. })
        ));
        assert!(matches!(
            JsonSchema::compile(&json!({ "type": 12 })),
            Err(SchemaError::CompileFailed(_))
        ));
    }
}
