//! The item shapes `MemoryConnector` writes and queries.
//!
//! `FlowMemoryItem` layers flow identity and a `MemoryType` discriminant on
//! top of `flow_retention::MemoryItem`; retention policies only ever see the
//! embedded item via `RetainableItem`, never the flow-specific fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use flow_retention::{MemoryItem, RetainableItem};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of record a `FlowMemoryItem` carries. Mirrors spec.md's
/// `MemoryType` enumeration exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryType {
    State,
    Execution,
    MethodResult,
    Error,
    Config,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::State => "STATE",
            MemoryType::Execution => "EXECUTION",
            MemoryType::MethodResult => "METHOD_RESULT",
            MemoryType::Error => "ERROR",
            MemoryType::Config => "CONFIG",
        }
    }
}

/// A `MemoryItem` scoped to one flow, tagged with the record kind it holds.
#[derive(Debug, Clone)]
pub struct FlowMemoryItem {
    pub inner: MemoryItem,
    pub flow_id: Uuid,
    pub flow_type: String,
    pub flow_version: u64,
    pub memory_type: MemoryType,
}

impl FlowMemoryItem {
    pub fn new(flow_id: Uuid, flow_type: impl Into<String>, flow_version: u64, memory_type: MemoryType,
                content: Vec<u8>)
                -> Self {
        let id = Uuid::new_v4().to_string();
        Self { inner: MemoryItem::new(id, content),
               flow_id,
               flow_type: flow_type.into(),
               flow_version,
               memory_type }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn content(&self) -> &[u8] {
        &self.inner.content
    }

    pub fn content_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.inner.content).ok()
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.inner.metadata = metadata;
        self
    }
}

/// Delegates to the embedded `MemoryItem` so retention policies can operate
/// over `FlowMemoryItem` without knowing about flows at all.
impl RetainableItem for FlowMemoryItem {
    fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at()
    }

    fn last_accessed_at(&self) -> DateTime<Utc> {
        self.inner.last_accessed_at()
    }

    fn metadata(&self) -> &HashMap<String, String> {
        self.inner.metadata()
    }

    fn relevance_score(&self) -> Option<f64> {
        self.inner.relevance_score()
    }
}
