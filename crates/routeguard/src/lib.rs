//! Configuration and request/response validation for HTTP server frameworks.
//!
//! routeguard checks a framework's own configuration objects against a fixed
//! catalog of structural rules, and validates live request and response data
//! against per-route schemas with a configurable failure policy.
//!
//! # Crate Structure
//!
//! - [`schema`]: rule language, evaluation seam, JSON Schema adapter and the
//!   configuration registry
//! - [`validate`]: request/response validator (behind `validate` feature)

/// Re-export schema types.
pub mod schema {
    pub use routeguard_schema::*;
}

/// Re-export validator types (requires `validate` feature).
#[cfg(feature = "validate")]
pub mod validate {
    pub use routeguard_validate::*;
}
