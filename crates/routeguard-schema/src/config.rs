/// Controls how JSON Schema documents are compiled into evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonSchemaConfig {
    /// When true, object schemas reject properties they do not declare,
    /// matching how native object rules treat unknown keys.
    pub strict_mode: bool,
    /// Maximum serialized size of a single schema document.
    pub max_schema_size: usize,
}

impl Default for JsonSchemaConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            max_schema_size: 256 * 1024,
        }
    }
}
