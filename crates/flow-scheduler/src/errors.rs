//! Error taxonomy for the scheduler, split from `flow_core::FlowCoreError`
//! the same way `chem-persistence::error::PersistenceError` is split from
//! `chem-core::errors::CoreEngineError`: graph-build faults are distinct
//! from run-time faults.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone)]
pub enum SchedulerError {
    #[error("flow id `{0}` is already registered")]
    DuplicateFlowId(Uuid),

    #[error("dependency references unregistered flow `{0}`")]
    UnknownDependency(Uuid),

    #[error("adding dependency {from} -> {to} would create a cycle")]
    Cycle { from: Uuid, to: Uuid },

    #[error("flow `{0}` failed: {1}")]
    FlowExecutionError(Uuid, String),

    #[error("flow `{0}` timed out after {1}ms")]
    TimeoutError(Uuid, u64),

    #[error("overall execution timed out after {0}ms")]
    TotalTimeoutError(u64),

    #[error("deadlock: {pending} flow(s) pending with nothing ready or running")]
    DeadlockError { pending: usize },

    #[error("execution cancelled")]
    CancellationError,

    #[error("checkpoint is missing a registered flow `{0}`")]
    UnknownCheckpointFlow(Uuid),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
