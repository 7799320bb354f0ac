use routeguard_schema::BoxFuture;
use serde_json::Value;

use crate::error::HttpError;
use crate::request::{Request, Response, Source};

/// What a custom fail handler decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Carry on with the request lifecycle.
    Continue,
    /// Fail the request with this error.
    Abort(HttpError),
    /// Skip the handler and send this response.
    Takeover(Response),
}

/// Reply interface handed to custom fail handlers.
#[derive(Debug)]
pub struct Reply {
    source: Source,
}

impl Reply {
    pub(crate) fn new(source: Source) -> Self {
        Self { source }
    }

    /// Source whose validation failed.
    pub fn source(&self) -> Source {
        self.source
    }

    pub fn proceed(self) -> Decision {
        Decision::Continue
    }

    pub fn error(self, error: HttpError) -> Decision {
        Decision::Abort(error)
    }

    pub fn response(self, status_code: u16, body: Value) -> Decision {
        Decision::Takeover(Response::plain(status_code, body))
    }
}

/// Route-supplied reaction to an input validation failure.
pub trait FailHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        request: &'a mut Request,
        reply: Reply,
        source: Source,
        error: HttpError,
    ) -> BoxFuture<'a, Decision>;
}

impl<F> FailHandler for F
where
    F: Fn(&mut Request, Reply, Source, HttpError) -> Decision + Send + Sync,
{
    fn handle<'a>(
        &'a self,
        request: &'a mut Request,
        reply: Reply,
        source: Source,
        error: HttpError,
    ) -> BoxFuture<'a, Decision> {
        let decision = self(request, reply, source, error);
        Box::pin(std::future::ready(decision))
    }
}
