//! Type-erased entry point into a registered `flow_core::Flow<S>`.
//!
//! The scheduler manages many flows whose state types `S` are unrelated to
//! each other, so it can't hold a `Vec<Flow<S>>` for a single `S`. `Flow::execute`
//! already returns a `serde_json::Value` regardless of `S`, so a thin
//! object-safe trait is enough to erase `S` at the scheduler boundary.

use async_trait::async_trait;
use flow_core::{Flow, FlowCoreResult, FlowStateData};
use serde_json::Value;

#[async_trait]
pub trait SchedulableFlow: Send + Sync {
    async fn execute(&self, input: Value) -> FlowCoreResult<Value>;
}

#[async_trait]
impl<S: FlowStateData> SchedulableFlow for Flow<S> {
    async fn execute(&self, input: Value) -> FlowCoreResult<Value> {
        Flow::execute(self, input).await
    }
}
