//! Per-flow execution metrics collection.
//!
//! `ExecutionTracker` accumulates timing and error counts for a single flow
//! run; `stop()` freezes it into a `FlowExecutionMetrics` snapshot suitable
//! for logging or for attaching to a `flow_finished` event payload.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One recorded method-duration sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDuration {
    pub method_name: String,
    pub duration_ms: u64,
}

/// A point-in-time sample of tracker state, recorded on state changes so
/// long-running flows can be inspected mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub state_change_count: u64,
    pub error_count: u64,
}

/// Frozen metrics for a completed (or in-progress) flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowExecutionMetrics {
    pub flow_id: String,
    pub execution_time_ms: u64,
    pub method_durations: Vec<MethodDuration>,
    pub state_change_count: u64,
    pub error_count: u64,
    pub samples: Vec<Sample>,
}

struct TrackerState {
    method_durations: Vec<MethodDuration>,
    in_flight: std::collections::HashMap<String, Instant>,
    state_change_count: u64,
    error_count: u64,
    samples: Vec<Sample>,
}

/// Tracks timing and error metrics for one flow run. Cheap to share behind
/// an `Arc` — all mutation is internally synchronized.
pub struct ExecutionTracker {
    flow_id: String,
    started_at: Instant,
    state: Mutex<TrackerState>,
}

impl ExecutionTracker {
    pub fn new(flow_id: impl Into<String>) -> Self {
        Self { flow_id: flow_id.into(),
               started_at: Instant::now(),
               state: Mutex::new(TrackerState { method_durations: Vec::new(),
                                                 in_flight: std::collections::HashMap::new(),
                                                 state_change_count: 0,
                                                 error_count: 0,
                                                 samples: Vec::new() }) }
    }

    pub fn record_method_start(&self, method_name: impl Into<String>) {
        self.state.lock().in_flight.insert(method_name.into(), Instant::now());
    }

    pub fn record_method_finish(&self, method_name: &str) {
        let mut state = self.state.lock();
        if let Some(started) = state.in_flight.remove(method_name) {
            let duration_ms = started.elapsed().as_millis() as u64;
            state.method_durations.push(MethodDuration { method_name: method_name.to_string(),
                                                           duration_ms });
        }
    }

    pub fn record_state_change(&self) {
        let mut state = self.state.lock();
        state.state_change_count += 1;
        let sample = Sample { at: Utc::now(),
                               state_change_count: state.state_change_count,
                               error_count: state.error_count };
        state.samples.push(sample);
    }

    pub fn record_error(&self) {
        self.state.lock().error_count += 1;
    }

    /// Freezes the tracker into a metrics snapshot. Can be called multiple
    /// times; it does not consume the tracker.
    pub fn stop(&self) -> FlowExecutionMetrics {
        let state = self.state.lock();
        FlowExecutionMetrics { flow_id: self.flow_id.clone(),
                               execution_time_ms: self.started_at.elapsed().as_millis() as u64,
                               method_durations: state.method_durations.clone(),
                               state_change_count: state.state_change_count,
                               error_count: state.error_count,
                               samples: state.samples.clone() }
    }
}

impl std::fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTracker").field("flow_id", &self.flow_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration as StdDuration;

    #[test]
    fn records_method_duration() {
        let tracker = ExecutionTracker::new("flow-1");
        tracker.record_method_start("step_a");
        sleep(StdDuration::from_millis(5));
        tracker.record_method_finish("step_a");

        let metrics = tracker.stop();
        assert_eq!(metrics.method_durations.len(), 1);
        assert_eq!(metrics.method_durations[0].method_name, "step_a");
    }

    #[test]
    fn counts_state_changes_and_errors() {
        let tracker = ExecutionTracker::new("flow-2");
        tracker.record_state_change();
        tracker.record_state_change();
        tracker.record_error();

        let metrics = tracker.stop();
        assert_eq!(metrics.state_change_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.samples.len(), 2);
    }
}
