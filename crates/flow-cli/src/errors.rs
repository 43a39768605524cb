//! CLI error taxonomy, split the same way the rest of the workspace splits
//! errors by boundary: a usage fault (bad arguments, missing file) is
//! distinct from an execution fault (the flow/scheduler itself failed).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("execution error: {0}")]
    Execution(String),
}

impl CliError {
    /// Exit code per spec.md §6: 0 success, 1 usage error, 2 execution failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 1,
            CliError::Execution(_) => 2,
        }
    }
}

impl From<flow_scheduler::SchedulerError> for CliError {
    fn from(err: flow_scheduler::SchedulerError) -> Self {
        CliError::Execution(err.to_string())
    }
}

impl From<flow_core::FlowCoreError> for CliError {
    fn from(err: flow_core::FlowCoreError) -> Self {
        CliError::Execution(err.to_string())
    }
}

impl From<flow_memory::MemoryError> for CliError {
    fn from(err: flow_memory::MemoryError) -> Self {
        CliError::Execution(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Usage(format!("could not read file: {err}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Usage(format!("invalid JSON: {err}"))
    }
}
