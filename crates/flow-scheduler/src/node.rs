//! FlowNode: one registered flow's scheduling state, independent of its
//! underlying `Flow<S>` type (see `schedulable`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schedulable::SchedulableFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Scheduled,
    Running,
    Successful,
    Failed,
    Cancelled,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Successful | NodeStatus::Failed | NodeStatus::Cancelled | NodeStatus::Skipped)
    }
}

/// A directed edge `from -> to`: `to` depends on `from` having produced a
/// successful result. `condition` gates whether `to` may start at all
/// (false ⇒ `to` is marked `skipped`); `data_mapping` shapes `from`'s result
/// before it's merged into `to`'s input.
#[derive(Clone)]
pub struct FlowEdge {
    pub from: Uuid,
    pub to: Uuid,
    pub condition: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
    pub data_mapping: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>,
}

/// One node in the scheduler's dependency graph. Holds the type-erased flow
/// plus the bookkeeping the scheduling algorithm mutates as it runs.
pub struct FlowNode {
    pub id: Uuid,
    pub flow: Arc<dyn SchedulableFlow>,
    pub depends_on: Vec<Uuid>,
    pub priority: i64,
    pub metadata: HashMap<String, Value>,
    pub status: NodeStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub on_critical_path: bool,
    pub insertion_order: usize,
}

impl FlowNode {
    pub fn new(id: Uuid, flow: Arc<dyn SchedulableFlow>, depends_on: Vec<Uuid>, priority: i64,
               metadata: HashMap<String, Value>, insertion_order: usize)
               -> Self {
        Self { id,
               flow,
               depends_on,
               priority,
               metadata,
               status: NodeStatus::Pending,
               result: None,
               error: None,
               start_time: None,
               end_time: None,
               attempts: 0,
               on_critical_path: false,
               insertion_order }
    }

    pub fn execution_time_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => Some((e - s).num_milliseconds()),
            _ => None,
        }
    }
}
