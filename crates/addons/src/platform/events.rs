//! Events emitted against managed objects.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

/// An event recorded against a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub object_id: String,
    pub reason: String,
    pub message: String,
}

/// Sink for object events, e.g. "ClusterStatusUpdated".
pub trait EventRecorder: Send + Sync {
    fn emit(&self, object_id: &str, reason: &str, message: &str);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn emit(&self, object_id: &str, reason: &str, message: &str) {
        info!(object = %object_id, reason = %reason, "{}", message);
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events with the given reason.
    pub fn with_reason(&self, reason: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn emit(&self, object_id: &str, reason: &str, message: &str) {
        let event = Event {
            object_id: object_id.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
