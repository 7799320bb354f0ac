use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde_json::Value;
use tracing::debug;

use crate::catalog::rule_for;
use crate::engine::Evaluate;
use crate::error::{ConfigError, SchemaError};
use crate::options::ValidationOptions;
use crate::rule::Rule;

/// Names of the framework configuration surfaces the registry knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaKind {
    Cache,
    Security,
    Labels,
    AbsPath,
    ConnectionBase,
    Server,
    Connection,
    Vhost,
    Route,
    Pre,
    Auth,
    RouteConfig,
    CachePolicy,
    Method,
    Register,
    State,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 16] = [
        SchemaKind::Cache,
        SchemaKind::Security,
        SchemaKind::Labels,
        SchemaKind::AbsPath,
        SchemaKind::ConnectionBase,
        SchemaKind::Server,
        SchemaKind::Connection,
        SchemaKind::Vhost,
        SchemaKind::Route,
        SchemaKind::Pre,
        SchemaKind::Auth,
        SchemaKind::RouteConfig,
        SchemaKind::CachePolicy,
        SchemaKind::Method,
        SchemaKind::Register,
        SchemaKind::State,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaKind::Cache => "cache",
            SchemaKind::Security => "security",
            SchemaKind::Labels => "labels",
            SchemaKind::AbsPath => "absPath",
            SchemaKind::ConnectionBase => "connectionBase",
            SchemaKind::Server => "server",
            SchemaKind::Connection => "connection",
            SchemaKind::Vhost => "vhost",
            SchemaKind::Route => "route",
            SchemaKind::Pre => "pre",
            SchemaKind::Auth => "auth",
            SchemaKind::RouteConfig => "routeConfig",
            SchemaKind::CachePolicy => "cachePolicy",
            SchemaKind::Method => "method",
            SchemaKind::Register => "register",
            SchemaKind::State => "state",
        }
    }

    /// One-line summary of what the kind describes.
    pub fn description(self) -> &'static str {
        match self {
            SchemaKind::Cache => "server cache provisioning entry",
            SchemaKind::Security => "security response headers",
            SchemaKind::Labels => "connection label or labels",
            SchemaKind::AbsPath => "absolute filesystem path",
            SchemaKind::ConnectionBase => "settings shared by server and connection",
            SchemaKind::Server => "server construction options",
            SchemaKind::Connection => "connection options including listener",
            SchemaKind::Vhost => "virtual host name or names",
            SchemaKind::Route => "route definition",
            SchemaKind::Pre => "route prerequisite",
            SchemaKind::Auth => "route authentication",
            SchemaKind::RouteConfig => "route configuration",
            SchemaKind::CachePolicy => "cache policy for server methods",
            SchemaKind::Method => "server method options",
            SchemaKind::Register => "plugin registration options",
            SchemaKind::State => "cookie state definition",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaKind {
    type Err = SchemaError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        SchemaKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| SchemaError::UnknownKind(name.to_string()))
    }
}

/// Frozen catalog of configuration rules, one per [`SchemaKind`].
pub struct Registry {
    rules: [Rule; 16],
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

impl Registry {
    fn new() -> Self {
        Self {
            rules: SchemaKind::ALL.map(rule_for),
        }
    }

    /// The process-wide catalog, built on first use.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    pub fn get(&self, kind: SchemaKind) -> &Rule {
        &self.rules[kind.index()]
    }

    /// Validate a configuration object against the rule for `kind`.
    ///
    /// Every violation is reported. On success the coerced value is
    /// returned; the caller must use it in place of the input.
    pub fn assert(
        &self,
        kind: SchemaKind,
        value: &Value,
        context: Option<&str>,
    ) -> Result<Value, ConfigError> {
        let options = ValidationOptions {
            abort_early: false,
            ..ValidationOptions::default()
        };

        match self.get(kind).evaluate(value, &options) {
            Ok(coerced) => {
                debug!(kind = %kind, context = context.unwrap_or(""), "configuration accepted");
                Ok(coerced.unwrap_or_else(|| value.clone()))
            }
            Err(err) => {
                debug!(
                    kind = %kind,
                    violations = err.details.len(),
                    "configuration rejected"
                );
                Err(ConfigError::Invalid {
                    kind,
                    context: context.map(str::to_string),
                    annotation: err.annotate(value),
                    details: err.details,
                })
            }
        }
    }
}

/// [`Registry::assert`] against the global catalog.
pub fn assert(kind: SchemaKind, value: &Value, context: Option<&str>) -> Result<Value, ConfigError> {
    Registry::global().assert(kind, value, context)
}

/// Like [`assert`], for construction paths that cannot return an error.
///
/// # Panics
///
/// Panics with the [`ConfigError`] message when `value` is invalid.
pub fn assert_or_panic(kind: SchemaKind, value: &Value, context: Option<&str>) -> Value {
    match assert(kind, value, context) {
        Ok(coerced) => coerced,
        Err(err) => panic!("{err}"),
    }
}
