use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Knobs applied while evaluating a value against a schema.
///
/// Deserializes from the camelCase shape used by connection-level
/// `validation` settings, e.g. `{"abortEarly": true, "stripUnknown": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    /// Stop at the first violation instead of collecting all of them.
    pub abort_early: bool,
    /// Coerce strings into numbers, booleans and binaries, and fill defaults.
    pub convert: bool,
    /// Accept object keys that a rule does not declare.
    pub allow_unknown: bool,
    /// Drop undeclared object keys instead of rejecting them.
    pub strip_unknown: bool,
    /// Free-form data that rules can reference (sibling request buckets).
    pub context: Map<String, Value>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            abort_early: false,
            convert: true,
            allow_unknown: false,
            strip_unknown: false,
            context: Map::new(),
        }
    }
}

impl ValidationOptions {
    /// Default options carrying only a context.
    pub fn with_context(context: Map<String, Value>) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Layer these per-call options over `defaults`.
    ///
    /// Flags come from `defaults`; context keys from `self` replace same-named
    /// keys in the default context.
    pub fn merged_over(self, defaults: &ValidationOptions) -> Self {
        let mut merged = defaults.clone();
        for (key, value) in self.context {
            merged.context.insert(key, value);
        }
        merged
    }

    /// Look up a dotted path (`params.id`) inside the context.
    pub fn context_value(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut cursor = self.context.get(first)?;
        for segment in segments {
            cursor = match cursor {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(cursor)
    }
}
