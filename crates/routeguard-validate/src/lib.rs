//! Request and response validation against per-route policies.
//!
//! Input validation runs once per source (headers, params, query, payload)
//! and reacts to failures according to the route's fail action. Response
//! validation optionally samples, prefers per-status schemas, and escalates
//! failures as server errors.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use routeguard_schema::Rule;
//! use routeguard_validate::{payload, Request, RoutePolicy, Source, ValidatePolicy};
//! use serde_json::json;
//!
//! # async fn run() {
//! let route = RoutePolicy {
//!     validate: ValidatePolicy::default().with_schema(
//!         Source::Payload,
//!         Rule::object_of([("name", Rule::string().required())]),
//!     ),
//!     response: None,
//! };
//! let mut request = Request::new(Arc::new(route)).with_bucket(Source::Payload, json!({}));
//! let err = payload(&mut request).await.unwrap_err();
//! assert_eq!(err.status_code(), 400);
//! # }
//! ```

pub mod error;
pub mod input;
pub mod log;
pub mod policy;
pub mod reply;
pub mod request;
pub mod response;

pub use error::{ErrorOutput, HttpError, PolicyError, Result};
pub use input::{headers, params, payload, query, validate_input, Next};
pub use log::{LogEvent, MemoryLogger, RequestLogger, TracingLogger};
pub use policy::{
    FailAction, Handlers, ResponseFailAction, ResponsePolicy, RoutePolicy, ValidatePolicy,
};
pub use reply::{Decision, FailHandler, Reply};
pub use request::{ConnectionSettings, Orig, Request, Response, Source, Variety};
pub use response::{validate_response, validate_response_with_rng};
