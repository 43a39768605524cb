//! `flowforge`: a facade crate wiring the flow-execution workspace
//! together — `flow-core` (single-flow dispatch), `flow-scheduler`
//! (multi-flow DAG orchestration), `flow-memory` (persistence),
//! `flow-retention` (retention policies and dedup), and `flow-events`
//! (the shared event bus) — plus a small demo flow used by the `flowforge`
//! binary and by this crate's own integration tests.

pub use flow_core::{
    Flow, FlowBuilder, FlowCoreError, FlowCoreResult, FlowState, FlowStateData, MethodDescriptor, MethodInput,
    MethodKind, MethodOutcome, StateHandle, TriggerSpec,
};
pub use flow_events::{kind, Event, EventBus, EventPriority};
pub use flow_memory::{FlowMemoryItem, MemoryConfig, MemoryConnector, MemoryError, MemoryType};
pub use flow_retention::{DeduplicatedContent, RetentionPolicy};
pub use flow_scheduler::{ExecutionResult, FlowScheduler, SchedulerError, SchedulerOptions};

pub mod demo;
