use std::fmt;
use std::sync::Arc;

use routeguard_schema::ValidationOptions;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::HttpError;
use crate::log::{RequestLogger, TracingLogger};
use crate::policy::RoutePolicy;

/// Request data bucket subject to input validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Headers,
    Params,
    Query,
    Payload,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Headers,
        Source::Params,
        Source::Query,
        Source::Payload,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Headers => "headers",
            Source::Params => "params",
            Source::Query => "query",
            Source::Payload => "payload",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket values as they were before validation replaced them.
///
/// Each slot is written once; later captures are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Orig {
    headers: Option<Value>,
    params: Option<Value>,
    query: Option<Value>,
    payload: Option<Value>,
}

impl Orig {
    pub fn get(&self, source: Source) -> Option<&Value> {
        match source {
            Source::Headers => self.headers.as_ref(),
            Source::Params => self.params.as_ref(),
            Source::Query => self.query.as_ref(),
            Source::Payload => self.payload.as_ref(),
        }
    }

    /// Returns false when the slot was already filled.
    pub fn capture(&mut self, source: Source, value: Value) -> bool {
        let slot = match source {
            Source::Headers => &mut self.headers,
            Source::Params => &mut self.params,
            Source::Query => &mut self.query,
            Source::Payload => &mut self.payload,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Connection-level settings relevant to validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Defaults layered under every validation call on this connection.
    pub validation: Option<ValidationOptions>,
}

impl ConnectionSettings {
    pub(crate) fn validation_defaults(&self) -> ValidationOptions {
        self.validation.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variety {
    #[default]
    Plain,
    File,
    Stream,
    View,
}

/// The response a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Plain {
        status_code: u16,
        variety: Variety,
        source: Value,
    },
    Error(HttpError),
}

impl Response {
    pub fn plain(status_code: u16, source: Value) -> Self {
        Response::Plain {
            status_code,
            variety: Variety::Plain,
            source,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Response::Plain { status_code, .. } => *status_code,
            Response::Error(error) => error.status_code(),
        }
    }

    /// Body as sent: the source for plain responses, the payload for errors.
    pub fn body(&self) -> &Value {
        match self {
            Response::Plain { source, .. } => source,
            Response::Error(error) => &error.output.payload,
        }
    }
}

/// Per-request state seen by the validators.
pub struct Request {
    pub headers: Value,
    pub params: Value,
    pub query: Value,
    pub payload: Value,
    pub orig: Orig,
    pub route: Arc<RoutePolicy>,
    pub connection: Arc<ConnectionSettings>,
    pub response: Option<Response>,
    pub logger: Arc<dyn RequestLogger>,
}

impl Request {
    /// Empty headers, params and query, no payload, default connection
    /// settings, events sent to `tracing`.
    pub fn new(route: Arc<RoutePolicy>) -> Self {
        Self {
            headers: Value::Object(Map::new()),
            params: Value::Object(Map::new()),
            query: Value::Object(Map::new()),
            payload: Value::Null,
            orig: Orig::default(),
            route,
            connection: Arc::new(ConnectionSettings::default()),
            response: None,
            logger: Arc::new(TracingLogger),
        }
    }

    pub fn with_bucket(mut self, source: Source, value: Value) -> Self {
        *self.bucket_mut(source) = value;
        self
    }

    pub fn with_connection(mut self, connection: Arc<ConnectionSettings>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }

    pub fn bucket(&self, source: Source) -> &Value {
        match source {
            Source::Headers => &self.headers,
            Source::Params => &self.params,
            Source::Query => &self.query,
            Source::Payload => &self.payload,
        }
    }

    pub fn bucket_mut(&mut self, source: Source) -> &mut Value {
        match source {
            Source::Headers => &mut self.headers,
            Source::Params => &mut self.params,
            Source::Query => &mut self.query,
            Source::Payload => &mut self.payload,
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("payload", &self.payload)
            .field("orig", &self.orig)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

/// Objects, arrays and null can be validated; scalars cannot.
pub(crate) fn is_object_like(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_) | Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn orig_is_write_once() {
        let mut orig = Orig::default();
        assert!(orig.capture(Source::Query, json!({ "page": "1" })));
        assert!(!orig.capture(Source::Query, json!({ "page": 1 })));
        assert_eq!(orig.get(Source::Query), Some(&json!({ "page": "1" })));
        assert_eq!(orig.get(Source::Payload), None);
    }

    #[test]
    fn connection_settings_deserialize() {
        let settings: ConnectionSettings =
            serde_json::from_value(json!({ "validation": { "allowUnknown": true } }))
                .expect("settings should deserialize");
        let defaults = settings.validation_defaults();
        assert!(defaults.allow_unknown);
        assert!(defaults.convert);

        let empty: ConnectionSettings =
            serde_json::from_value(json!({})).expect("settings should deserialize");
        assert_eq!(empty.validation, None);
    }

    #[test]
    fn buckets_by_source() {
        let request = Request::new(Arc::new(RoutePolicy::default()))
            .with_bucket(Source::Params, json!({ "id": "7" }));
        assert_eq!(request.bucket(Source::Params), &json!({ "id": "7" }));
        assert_eq!(request.bucket(Source::Payload), &Value::Null);
        assert!(is_object_like(request.bucket(Source::Payload)));
        assert!(!is_object_like(&json!("text")));
    }
}
