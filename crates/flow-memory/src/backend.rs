//! Storage abstraction the connector writes through, generalizing the
//! teacher's `EventStore`/`FlowRepository` split
//! (`chem-core::event::EventStore`, `chem-persistence::pg::PgEventStore`)
//! from an append-only event log to arbitrary typed memory records.

#[cfg(feature = "sled-backend")]
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::MemoryError;
use crate::item::{FlowMemoryItem, MemoryType};

/// A query over one flow's memory records.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub flow_id: Uuid,
    pub memory_type: Option<MemoryType>,
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new(flow_id: Uuid) -> Self {
        Self { flow_id, memory_type: None, before: None, limit: None }
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn before(mut self, at: DateTime<Utc>) -> Self {
        self.before = Some(at);
        self
    }
}

/// Storage the connector writes and queries through. Implementations keep
/// items sorted by `created_at` ascending internally; `query` always
/// returns results sorted newest-first, matching `getFlowStateHistory`'s
/// "sorted by timestamp desc" contract in spec.md §4.3.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn insert(&self, item: FlowMemoryItem) -> Result<(), MemoryError>;

    async fn query(&self, query: MemoryQuery) -> Result<Vec<FlowMemoryItem>, MemoryError>;

    /// Bulk-removes matching items, returning the count removed.
    async fn delete(&self, flow_id: Uuid, memory_type: Option<MemoryType>, older_than: Option<DateTime<Utc>>)
                     -> Result<usize, MemoryError>;
}

/// Default backend: a `dashmap`-sharded, process-local store. `dashmap` is
/// already a chem-gl-chemflow workspace dependency (unused by `chem-core`
/// itself); this is the intention it was carried for.
#[derive(Default)]
pub struct InMemoryBackend {
    items: dashmap::DashMap<Uuid, Vec<FlowMemoryItem>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn insert(&self, item: FlowMemoryItem) -> Result<(), MemoryError> {
        self.items.entry(item.flow_id).or_default().push(item);
        Ok(())
    }

    async fn query(&self, query: MemoryQuery) -> Result<Vec<FlowMemoryItem>, MemoryError> {
        let mut out: Vec<FlowMemoryItem> = self.items
                                                .get(&query.flow_id)
                                                .map(|entries| {
                                                    entries.iter()
                                                           .filter(|item| {
                                                               query.memory_type
                                                                    .map(|t| t == item.memory_type)
                                                                    .unwrap_or(true)
                                                               && query.before
                                                                       .map(|before| item.inner.created_at < before)
                                                                       .unwrap_or(true)
                                                           })
                                                           .cloned()
                                                           .collect()
                                                })
                                                .unwrap_or_default();
        out.sort_by(|a, b| b.inner.created_at.cmp(&a.inner.created_at));
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn delete(&self, flow_id: Uuid, memory_type: Option<MemoryType>, older_than: Option<DateTime<Utc>>)
                     -> Result<usize, MemoryError> {
        let mut removed = 0usize;
        if let Some(mut entries) = self.items.get_mut(&flow_id) {
            let before = entries.len();
            entries.retain(|item| {
                       let matches_type = memory_type.map(|t| t == item.memory_type).unwrap_or(true);
                       let is_older = older_than.map(|cutoff| item.inner.created_at < cutoff).unwrap_or(true);
                       !(matches_type && is_older)
                   });
            removed = before - entries.len();
        }
        Ok(removed)
    }
}

/// On-disk record shape for the sled backend. `FlowMemoryItem` itself
/// doesn't derive `Serialize` (its embedded `MemoryItem` carries raw
/// content bytes with no canonical wire format imposed by `flow-retention`),
/// so the durable backend owns its own serializable projection.
#[cfg(feature = "sled-backend")]
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredItem {
    id: String,
    flow_id: Uuid,
    flow_type: String,
    flow_version: u64,
    memory_type: MemoryType,
    content: Vec<u8>,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
}

#[cfg(feature = "sled-backend")]
impl From<&FlowMemoryItem> for StoredItem {
    fn from(item: &FlowMemoryItem) -> Self {
        Self { id: item.inner.id.clone(),
               flow_id: item.flow_id,
               flow_type: item.flow_type.clone(),
               flow_version: item.flow_version,
               memory_type: item.memory_type,
               content: item.inner.content.clone(),
               metadata: item.inner.metadata.clone(),
               created_at: item.inner.created_at,
               last_accessed_at: item.inner.last_accessed_at }
    }
}

#[cfg(feature = "sled-backend")]
impl From<StoredItem> for FlowMemoryItem {
    fn from(stored: StoredItem) -> Self {
        let mut item = FlowMemoryItem::new(stored.flow_id, stored.flow_type, stored.flow_version,
                                            stored.memory_type, stored.content);
        item.inner.id = stored.id;
        item.inner.metadata = stored.metadata;
        item.inner.created_at = stored.created_at;
        item.inner.last_accessed_at = stored.last_accessed_at;
        item
    }
}

/// Durable backend, grounded on `knhk-workflow-engine`'s
/// sled-backed `StateStore` (feature-gated the same way that crate gates
/// its `storage = ["sled"]` feature).
#[cfg(feature = "sled-backend")]
pub struct SledBackend {
    db: sled::Db,
}

#[cfg(feature = "sled-backend")]
impl SledBackend {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, MemoryError> {
        let db = sled::open(path).map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn key(flow_id: Uuid, item_id: &str) -> Vec<u8> {
        format!("{flow_id}:{item_id}").into_bytes()
    }
}

#[cfg(feature = "sled-backend")]
#[async_trait]
impl MemoryBackend for SledBackend {
    async fn insert(&self, item: FlowMemoryItem) -> Result<(), MemoryError> {
        let key = Self::key(item.flow_id, item.id());
        let stored = StoredItem::from(&item);
        let bytes = serde_json::to_vec(&stored)?;
        self.db.insert(key, bytes).map_err(|e| MemoryError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, query: MemoryQuery) -> Result<Vec<FlowMemoryItem>, MemoryError> {
        let prefix = format!("{}:", query.flow_id);
        let mut out = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = entry.map_err(|e| MemoryError::Backend(e.to_string()))?;
            let stored: StoredItem = serde_json::from_slice(&value)?;
            let item: FlowMemoryItem = stored.into();
            if query.memory_type.map(|t| t == item.memory_type).unwrap_or(true)
               && query.before.map(|before| item.inner.created_at < before).unwrap_or(true)
            {
                out.push(item);
            }
        }
        out.sort_by(|a, b| b.inner.created_at.cmp(&a.inner.created_at));
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn delete(&self, flow_id: Uuid, memory_type: Option<MemoryType>, older_than: Option<DateTime<Utc>>)
                     -> Result<usize, MemoryError> {
        let prefix = format!("{flow_id}:");
        let mut removed = 0usize;
        let mut to_remove = Vec::new();
        for entry in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry.map_err(|e| MemoryError::Backend(e.to_string()))?;
            let stored: StoredItem = serde_json::from_slice(&value)?;
            let matches_type = memory_type.map(|t| t == stored.memory_type).unwrap_or(true);
            let is_older = older_than.map(|cutoff| stored.created_at < cutoff).unwrap_or(true);
            if matches_type && is_older {
                to_remove.push(key);
            }
        }
        for key in to_remove {
            self.db.remove(key).map_err(|e| MemoryError::Backend(e.to_string()))?;
            removed += 1;
        }
        Ok(removed)
    }
}
