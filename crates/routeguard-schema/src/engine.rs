//! The evaluation seam shared by native rules, JSON Schema documents and
//! caller-supplied async validators.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ValidationError;
use crate::options::ValidationOptions;
use crate::rule::Rule;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `Ok(Some(v))` replaces the input with the coerced `v`; `Ok(None)` keeps
/// the input as-is. On `Err`, [`ValidationError::value`] may carry the
/// partially coerced input.
pub type Outcome = Result<Option<Value>, ValidationError>;

/// Synchronous schema engine.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, value: &Value, options: &ValidationOptions) -> Outcome;
}

type DynamicFn = dyn Fn(Value, ValidationOptions) -> BoxFuture<'static, Outcome> + Send + Sync;

/// Caller-supplied async validator.
#[derive(Clone)]
pub struct DynamicSchema {
    inner: Arc<DynamicFn>,
}

impl DynamicSchema {
    pub fn new<F, Fut>(validator: F) -> Self
    where
        F: Fn(Value, ValidationOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |value, options| Box::pin(validator(value, options))),
        }
    }

    pub fn call(&self, value: Value, options: ValidationOptions) -> BoxFuture<'static, Outcome> {
        (self.inner)(value, options)
    }
}

/// A compiled schema of either flavor.
#[derive(Clone)]
pub enum Schema {
    Static(Arc<dyn Evaluate>),
    Dynamic(DynamicSchema),
}

impl Schema {
    pub fn from_evaluator<E: Evaluate + 'static>(evaluator: E) -> Self {
        Schema::Static(Arc::new(evaluator))
    }

    pub fn dynamic<F, Fut>(validator: F) -> Self
    where
        F: Fn(Value, ValidationOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Schema::Dynamic(DynamicSchema::new(validator))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Schema::Dynamic(_))
    }
}

impl From<Rule> for Schema {
    fn from(rule: Rule) -> Self {
        Schema::from_evaluator(rule)
    }
}

impl From<DynamicSchema> for Schema {
    fn from(schema: DynamicSchema) -> Self {
        Schema::Dynamic(schema)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Static(_) => f.write_str("Schema::Static(..)"),
            Schema::Dynamic(_) => f.write_str("Schema::Dynamic(..)"),
        }
    }
}

/// Apply `schema` to `value`, awaiting dynamic validators.
pub async fn evaluate(value: &Value, schema: &Schema, options: &ValidationOptions) -> Outcome {
    match schema {
        Schema::Static(evaluator) => evaluator.evaluate(value, options),
        Schema::Dynamic(dynamic) => dynamic.call(value.clone(), options.clone()).await,
    }
}
