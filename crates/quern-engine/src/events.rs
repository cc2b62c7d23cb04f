//! Event types for observing engine progress
//!
//! Events are sent from the engine to any consumer (stats collectors, build
//! UIs, test probes) to report cache traffic, compute activity, and action
//! dispatch. Delivery failures never fail a build.

use serde::{Deserialize, Serialize};

/// Trait for receiving engine events
///
/// Abstracts over the transport (mpsc, log forwarding, in-memory capture)
/// so the engine can be observed in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel
    /// closed); the engine logs and continues.
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when delivering events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

/// Events emitted during evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A build request entered the engine
    #[serde(rename_all = "camelCase")]
    BuildStarted { cache_path: String, build_id: String },

    /// A build request completed successfully
    #[serde(rename_all = "camelCase")]
    BuildFinished { cache_path: String },

    /// A build request failed
    #[serde(rename_all = "camelCase")]
    BuildFailed { cache_path: String, error: String },

    /// A cached value satisfied the request
    #[serde(rename_all = "camelCase")]
    CacheHit { cache_path: String },

    /// A compute began (cache miss or controlled recompute)
    #[serde(rename_all = "camelCase")]
    ComputeStarted { cache_path: String },

    /// A compute finished and its value was stored
    #[serde(rename_all = "camelCase")]
    ComputeFinished { cache_path: String },

    /// An action was handed to the executor
    #[serde(rename_all = "camelCase")]
    ActionSpawned { action_type: String },

    /// The executor returned an action result
    #[serde(rename_all = "camelCase")]
    ActionFinished {
        action_type: String,
        exit_code: Option<i32>,
    },
}

/// Sink that drops every event.
#[derive(Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Sink that captures events in memory, for tests and diagnostics.
#[derive(Default)]
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all captured events.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Count captured events matching a predicate.
    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
