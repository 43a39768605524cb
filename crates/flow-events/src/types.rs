//! Structured event envelope shared by the flow runtime, the scheduler, and
//! the memory connector.
//!
//! Every event carries a fixed schema: a type name, a timestamp, a priority
//! band, and a JSON payload. The payload shape is not enforced here —
//! callers agree on it by event type (see the well-known type name
//! constants below).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dispatch priority band. Higher bands are drained first by the bus;
/// within a band, delivery is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    Low,
    Normal,
    High,
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

/// A structured event published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub priority: EventPriority,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self { event_type: event_type.into(),
               timestamp: Utc::now(),
               priority: EventPriority::Normal,
               payload }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Well-known event type names. Flow-runtime and scheduler-level events
/// share one bus; consumers match on these strings (or subscribe to the
/// wildcard `"*"`).
pub mod kind {
    pub const FLOW_STARTED: &str = "flow_started";
    pub const FLOW_FINISHED: &str = "flow_finished";
    pub const STATE_CHANGED: &str = "state_changed";
    pub const METHOD_EXECUTION_STARTED: &str = "method_execution_started";
    pub const METHOD_EXECUTION_FINISHED: &str = "method_execution_finished";
    pub const METHOD_EXECUTION_FAILED: &str = "method_execution_failed";
    pub const ERROR: &str = "error";

    pub const EXECUTION_STARTED: &str = "execution_started";
    pub const EXECUTION_COMPLETED: &str = "execution_completed";
    pub const EXECUTION_FAILED: &str = "execution_failed";
    pub const CHECKPOINT_CREATED: &str = "checkpoint_created";
    pub const FLOW_RETRY: &str = "flow_retry";

    /// Subscribe to every event type.
    pub const WILDCARD: &str = "*";
}
