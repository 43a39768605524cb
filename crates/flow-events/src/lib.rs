//! Event bus and per-flow execution tracker shared by the flow runtime, the
//! scheduler, and the memory connector.

pub mod bus;
pub mod tracker;
pub mod types;

pub use bus::{EventBus, Handler};
pub use tracker::{ExecutionTracker, FlowExecutionMetrics, MethodDuration, Sample};
pub use types::{kind, Event, EventPriority};
