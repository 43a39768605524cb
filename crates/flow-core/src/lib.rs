//! flow-core: deterministic single-flow dispatch.
//!
//! Provides the neutral (domain-agnostic) contracts and minimal
//! orchestration needed to execute one flow's method graph to completion:
//! start/listener/router dispatch, AND/OR join semantics, router
//! suppression, and lifecycle event emission. Multi-flow scheduling lives
//! in `flow-scheduler`; persistence lives in `flow-memory`.
//!
//! - `state`: the opaque, versioned state container a flow owns.
//! - `method`: method descriptors, trigger specs, and the async body type.
//! - `trigger`: trigger-graph validation (dangling references, cycles).
//! - `builder`: the two-phase builder that freezes a method table.
//! - `engine`: the dispatch loop (`Flow::execute`).
//! - `events`: local lifecycle-event subscription, bridgeable to a shared
//!   `flow_events::EventBus`.
//! - `hashing`: canonical JSON + content hashing, reused by `flow-retention`
//!   for content addressing and by `flow-scheduler` for fingerprints.
//! - `errors`: the crate's error taxonomy.

pub mod builder;
pub mod engine;
pub mod errors;
pub mod events;
pub mod hashing;
pub mod method;
pub mod result;
pub mod state;
pub mod trigger;

pub use builder::FlowBuilder;
pub use engine::{Flow, StateHandle};
pub use errors::{FlowCoreError, FlowCoreResult};
pub use method::{MethodDescriptor, MethodInput, MethodKind, MethodOutcome, TriggerSpec};
pub use result::{MethodExecutionResult, MethodStatus};
pub use state::{FlowState, FlowStateData};
