//! Checkpoint: a serializable snapshot of scheduler execution state,
//! persisted via `flow_memory::MemoryConnector` at `checkpointIntervalMs`
//! and on terminal exit, and restorable with `restore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{SchedulerError, SchedulerResult};
use crate::graph::FlowGraph;
use crate::node::NodeStatus;

const CHECKPOINT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusSnapshot {
    pub id: Uuid,
    pub status: NodeStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub on_critical_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub execution_start_time: DateTime<Utc>,
    pub pending: Vec<Uuid>,
    pub running: Vec<Uuid>,
    pub completed: Vec<(Uuid, Value)>,
    pub failed: Vec<(Uuid, String)>,
    pub node_statuses: Vec<NodeStatusSnapshot>,
    pub flow_metrics: Vec<(Uuid, i64)>,
    pub critical_path: Vec<Uuid>,
}

/// Snapshots the current state of every node in `graph`.
pub fn build(graph: &FlowGraph, execution_start_time: DateTime<Utc>, critical_path: &[Uuid]) -> Checkpoint {
    let mut pending = Vec::new();
    let mut running = Vec::new();
    let mut completed = Vec::new();
    let mut failed = Vec::new();
    let mut node_statuses = Vec::new();
    let mut flow_metrics = Vec::new();

    for node in graph.nodes() {
        match node.status {
            NodeStatus::Pending | NodeStatus::Scheduled => pending.push(node.id),
            NodeStatus::Running => running.push(node.id),
            NodeStatus::Successful => completed.push((node.id, node.result.clone().unwrap_or(Value::Null))),
            NodeStatus::Failed => failed.push((node.id, node.error.clone().unwrap_or_default())),
            NodeStatus::Cancelled | NodeStatus::Skipped => {}
        }
        node_statuses.push(NodeStatusSnapshot { id: node.id,
                                                 status: node.status,
                                                 start_time: node.start_time,
                                                 end_time: node.end_time,
                                                 on_critical_path: node.on_critical_path });
        if let Some(ms) = node.execution_time_ms() {
            flow_metrics.push((node.id, ms));
        }
    }

    Checkpoint { version: CHECKPOINT_VERSION.to_string(),
                 timestamp: Utc::now(),
                 execution_start_time,
                 pending,
                 running,
                 completed,
                 failed,
                 node_statuses,
                 flow_metrics,
                 critical_path: critical_path.to_vec() }
}

/// Restores `graph`'s runtime state from `checkpoint`. Only mutates nodes
/// already registered in `graph` (registration itself is not part of
/// restore); unknown ids are a hard error rather than silently dropped.
pub fn restore(graph: &mut FlowGraph, checkpoint: &Checkpoint) -> SchedulerResult<()> {
    for (id, result) in &checkpoint.completed {
        let node = graph.node_mut(id).ok_or(SchedulerError::UnknownCheckpointFlow(*id))?;
        node.status = NodeStatus::Successful;
        node.result = Some(result.clone());
    }
    for (id, error) in &checkpoint.failed {
        let node = graph.node_mut(id).ok_or(SchedulerError::UnknownCheckpointFlow(*id))?;
        node.status = NodeStatus::Failed;
        node.error = Some(error.clone());
    }
    // Running-at-checkpoint-time flows resume as pending, per spec.md §4.2.
    for id in &checkpoint.running {
        let node = graph.node_mut(id).ok_or(SchedulerError::UnknownCheckpointFlow(*id))?;
        node.status = NodeStatus::Pending;
    }
    for id in &checkpoint.pending {
        if let Some(node) = graph.node_mut(id) {
            if !matches!(node.status, NodeStatus::Successful | NodeStatus::Failed) {
                node.status = NodeStatus::Pending;
            }
        }
    }
    for snapshot in &checkpoint.node_statuses {
        if let Some(node) = graph.node_mut(&snapshot.id) {
            node.start_time = snapshot.start_time;
            node.end_time = snapshot.end_time;
            node.on_critical_path = snapshot.on_critical_path;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use flow_core::{FlowCoreResult, FlowCoreError};
    use serde_json::json;

    use super::*;
    use crate::schedulable::SchedulableFlow;

    struct StubFlow;

    #[async_trait]
    impl SchedulableFlow for StubFlow {
        async fn execute(&self, _input: Value) -> FlowCoreResult<Value> {
            Err(FlowCoreError::Internal("unused in this test".into()))
        }
    }

    #[test]
    fn restore_moves_running_back_to_pending_and_rehydrates_results() {
        let mut graph = FlowGraph::new();
        let a = graph.register(None, Arc::new(StubFlow), vec![], 0, Default::default()).unwrap();
        let b = graph.register(None, Arc::new(StubFlow), vec![], 0, Default::default()).unwrap();

        let checkpoint = Checkpoint { version: CHECKPOINT_VERSION.to_string(),
                                       timestamp: Utc::now(),
                                       execution_start_time: Utc::now(),
                                       pending: vec![],
                                       running: vec![b],
                                       completed: vec![(a, json!({"ok": true}))],
                                       failed: vec![],
                                       node_statuses: vec![],
                                       flow_metrics: vec![],
                                       critical_path: vec![a] };

        restore(&mut graph, &checkpoint).unwrap();

        assert_eq!(graph.node(&a).unwrap().status, NodeStatus::Successful);
        assert_eq!(graph.node(&a).unwrap().result, Some(json!({"ok": true})));
        assert_eq!(graph.node(&b).unwrap().status, NodeStatus::Pending);
    }
}
