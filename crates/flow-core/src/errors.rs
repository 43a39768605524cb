//! Error taxonomy for the flow runtime.
//!
//! One enum per crate boundary, following the same split the rest of the
//! workspace uses (`flow-memory::MemoryError`, `flow-scheduler::SchedulerError`):
//! graph-time faults are distinguished from dispatch-time faults so callers
//! can tell "your flow definition is malformed" from "a method of an
//! otherwise-valid flow failed".

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowCoreError {
    #[error("trigger references unknown method `{0}`")]
    UnknownTriggerReference(String),

    #[error("trigger graph contains a cycle reachable from `{0}`")]
    TriggerGraphCycle(String),

    #[error("flow defines no start methods")]
    NoStartMethods,

    #[error("method `{0}` is registered more than once")]
    DuplicateMethod(String),

    #[error("method `{method}` failed: {message}")]
    MethodFailed { method: String, message: String },

    #[error("flow already completed")]
    FlowCompleted,

    #[error("flow has already failed and stop-on-failure applies")]
    FlowHasFailed,

    #[error("internal: {0}")]
    Internal(String),
}

pub type FlowCoreResult<T> = Result<T, FlowCoreError>;
