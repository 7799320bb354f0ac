use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Sink for request-scoped events such as validation failures.
pub trait RequestLogger: Send + Sync {
    fn log(&self, tags: &[&str], data: &Value);
}

/// Emits every event as a `tracing` warning.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn log(&self, tags: &[&str], data: &Value) {
        warn!(tags = %tags.join(","), data = %data, "request event");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub tags: Vec<String>,
    pub data: Value,
}

/// Keeps events in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RequestLogger for MemoryLogger {
    fn log(&self, tags: &[&str], data: &Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEvent {
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                data: data.clone(),
            });
    }
}
