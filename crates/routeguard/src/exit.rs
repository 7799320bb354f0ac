use std::fmt;
use std::io;

use routeguard_schema::{ConfigError, SchemaError};
use routeguard_validate::PolicyError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn json_error(context: &str, err: serde_json::Error) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn policy_error(context: &str, err: PolicyError) -> CliError {
    match err {
        PolicyError::Config(err) => config_error(context, err),
        PolicyError::Schema(SchemaError::UnknownKind(kind)) => {
            CliError::new(USAGE, format!("{context}: unknown schema kind '{kind}'"))
        }
        PolicyError::UnknownHandler(name) => CliError::new(
            USAGE,
            format!("{context}: function reference '{name}' has no handler on the command line"),
        ),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}
