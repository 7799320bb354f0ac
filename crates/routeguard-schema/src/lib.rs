//! Declarative schema rules and the configuration schema registry.
//!
//! Two layers live here:
//! - a small schema language ([`Rule`]) with coercion, alternation and
//!   cross-field constraints, plus the [`Evaluate`] seam that lets any other
//!   engine (for example [`JsonSchema`]) stand in for it;
//! - the [`Registry`], a frozen catalog of named rules for every framework
//!   configuration surface, reached through [`assert`].
//!
//! Configuration errors are fatal by contract: an `Err` from [`assert`] means
//! the server or route must not be constructed.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod json_schema;
pub mod options;
pub mod registry;
pub mod rule;

pub use config::JsonSchemaConfig;
pub use engine::{evaluate, BoxFuture, DynamicSchema, Evaluate, Outcome, Schema};
pub use error::{ConfigError, Detail, Result, SchemaError, ValidationError};
pub use json_schema::JsonSchema;
pub use options::ValidationOptions;
pub use registry::{assert, assert_or_panic, Registry, SchemaKind};
pub use rule::{func_ref, func_ref_name, Reference, Rule, FUNC_REF_KEY};
