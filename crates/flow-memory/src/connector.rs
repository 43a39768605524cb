//! Bridges `Flow` lifecycle events to the storage backend.
//!
//! `MemoryConnector::connect_to_flow` subscribes to a flow's local event
//! emitter (`flow_core::Flow::on`) the way `chem-core::event::EventStore`
//! appends to its log on every state transition (mirrored on the read side
//! by `chem-persistence::pg::PgFlowRepository`'s replay), generalized from
//! an append-only event log to typed, queryable memory records with
//! retention and debounced writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flow_core::{Flow, FlowStateData};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::{MemoryBackend, MemoryQuery};
use crate::config::MemoryConfig;
use crate::errors::MemoryError;
use crate::item::{FlowMemoryItem, MemoryType};

/// `persistFlowState`'s status discriminant, per spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStateStatus {
    Started,
    Updated,
    Finished,
}

impl FlowStateStatus {
    fn as_str(&self) -> &'static str {
        match self {
            FlowStateStatus::Started => "started",
            FlowStateStatus::Updated => "updated",
            FlowStateStatus::Finished => "finished",
        }
    }
}

struct CachedState {
    value: Value,
    cached_at: Instant,
}

/// Debounce bookkeeping for one flow's `state_changed`-triggered writes:
/// the most recently seen state (overwritten on every tick) and whether a
/// flush is already scheduled.
struct DebounceSlot {
    pending: Mutex<Option<Value>>,
    flush_scheduled: std::sync::atomic::AtomicBool,
}

/// The persistence boundary between flow lifecycle events and storage.
/// Cheap to clone (wraps an `Arc` internally via its callers); typically
/// held as `Arc<MemoryConnector>` so its event-handler closures can hold
/// their own clone.
pub struct MemoryConnector {
    backend: Arc<dyn MemoryBackend>,
    config: MemoryConfig,
    latest_state_cache: DashMap<Uuid, CachedState>,
    debounce: DashMap<Uuid, Arc<DebounceSlot>>,
}

/// Drops the `events` field by convention and leaves the rest of the value
/// untouched — serde_json values can't carry functions, live resources, or
/// cycles, so that part of spec.md's canonicalization rule is automatic;
/// this covers the one remaining rule that needs an explicit pass.
fn canonicalize_state(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if k == "events" {
                    continue;
                }
                out.insert(k.clone(), canonicalize_state(v));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

impl MemoryConnector {
    pub fn new(backend: Arc<dyn MemoryBackend>, config: MemoryConfig) -> Arc<Self> {
        Arc::new(Self { backend,
                         config,
                         latest_state_cache: DashMap::new(),
                         debounce: DashMap::new() })
    }

    /// Subscribes to a flow's lifecycle events and starts persisting them.
    /// Emits an initial `CONFIG` record immediately. Call before `flow.execute()`.
    pub fn connect_to_flow<S: FlowStateData>(self: &Arc<Self>, flow: &Flow<S>, flow_id: Uuid,
                                              flow_type: impl Into<String>, flow_version: u64) {
        let flow_type = flow_type.into();

        {
            let connector = self.clone();
            let ft = flow_type.clone();
            let state_cell = flow.state_cell();
            tokio::spawn(async move {
                let snapshot = state_cell.read().await.data.clone();
                let value = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
                let _ = connector.persist_flow_config(flow_id, &ft, flow_version, Value::Null).await;
                let _ = connector.persist_flow_state(flow_id, &ft, flow_version, FlowStateStatus::Started, value)
                                 .await;
            });
        }

        let state_cell = flow.state_cell();
        let connector = self.clone();
        let ft = flow_type.clone();
        flow.on(flow_events::kind::FLOW_FINISHED, Arc::new(move |_payload| {
                let connector = connector.clone();
                let ft = ft.clone();
                let state_cell = state_cell.clone();
                tokio::spawn(async move {
                    let snapshot = state_cell.read().await.data.clone();
                    let value = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
                    let _ = connector.persist_flow_state(flow_id, &ft, flow_version, FlowStateStatus::Finished,
                                                          value)
                                     .await;
                });
            }));

        let connector = self.clone();
        let ft = flow_type.clone();
        flow.on(flow_events::kind::METHOD_EXECUTION_FINISHED,
                Arc::new(move |payload| {
                    let connector = connector.clone();
                    let ft = ft.clone();
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        let method_name = payload.get("methodName")
                                                  .and_then(Value::as_str)
                                                  .unwrap_or("unknown")
                                                  .to_string();
                        let _ =
                            connector.persist_method_result(flow_id, &ft, flow_version, &method_name, payload).await;
                    });
                }));

        let connector = self.clone();
        let ft = flow_type.clone();
        flow.on(flow_events::kind::ERROR,
                Arc::new(move |payload| {
                    let connector = connector.clone();
                    let ft = ft.clone();
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        let message =
                            payload.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
                        let _ = connector.persist_flow_error(flow_id, &ft, flow_version, &message, payload).await;
                    });
                }));

        let connector = self.clone();
        let ft = flow_type.clone();
        flow.on(flow_events::kind::METHOD_EXECUTION_FAILED,
                Arc::new(move |payload| {
                    let connector = connector.clone();
                    let ft = ft.clone();
                    let payload = payload.clone();
                    tokio::spawn(async move {
                        let message =
                            payload.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
                        let _ = connector.persist_flow_error(flow_id, &ft, flow_version, &message, payload).await;
                    });
                }));

        if self.config.persist_state_on_every_change {
            let connector = self.clone();
            let ft = flow_type;
            let state_cell = flow.state_cell();
            flow.on(flow_events::kind::STATE_CHANGED,
                    Arc::new(move |_payload| {
                        connector.schedule_debounced_write(flow_id, ft.clone(), flow_version, state_cell.clone());
                    }));
        }
    }

    fn schedule_debounced_write<S: FlowStateData>(self: &Arc<Self>, flow_id: Uuid, flow_type: String,
                                                   flow_version: u64,
                                                   state_cell: Arc<tokio::sync::RwLock<flow_core::FlowState<S>>>) {
        let slot = self.debounce.entry(flow_id).or_insert_with(|| {
                                     Arc::new(DebounceSlot { pending: Mutex::new(None),
                                                              flush_scheduled:
                                                                  std::sync::atomic::AtomicBool::new(false) })
                                 })
                       .clone();

        // The pending value is read fresh off `state_cell` at flush time, so
        // we just need to mark that a write is owed; nothing to stash here
        // beyond the flag, since flush reads the latest snapshot itself.
        *slot.pending.lock() = Some(Value::Bool(true));

        if slot.flush_scheduled.swap(true, std::sync::atomic::Ordering::SeqCst) {
            return;
        }

        let connector = self.clone();
        let debounce = self.config.state_persistence_debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            slot.flush_scheduled.store(false, std::sync::atomic::Ordering::SeqCst);
            slot.pending.lock().take();
            let snapshot = state_cell.read().await.data.clone();
            let value = serde_json::to_value(&snapshot).unwrap_or(Value::Null);
            let _ = connector.persist_flow_state(flow_id, &flow_type, flow_version, FlowStateStatus::Updated, value)
                             .await;
        });
    }

    pub async fn persist_flow_state(&self, flow_id: Uuid, flow_type: &str, flow_version: u64,
                                     status: FlowStateStatus, state: Value)
                                     -> Result<(), MemoryError> {
        let canonical = canonicalize_state(&state);
        let mut metadata = HashMap::new();
        metadata.insert("status".to_string(), status.as_str().to_string());
        let bytes = serde_json::to_vec(&canonical)?;
        let item = FlowMemoryItem::new(flow_id, flow_type, flow_version, MemoryType::State, bytes)
            .with_metadata(metadata);

        self.backend.insert(item).await?;
        self.latest_state_cache.insert(flow_id, CachedState { value: canonical, cached_at: Instant::now() });
        self.enforce_state_snapshot_cap(flow_id).await?;
        Ok(())
    }

    async fn enforce_state_snapshot_cap(&self, flow_id: Uuid) -> Result<(), MemoryError> {
        if self.config.max_state_snapshots_per_flow == 0 {
            return Ok(());
        }
        let history = self.backend
                           .query(MemoryQuery::new(flow_id).with_type(MemoryType::State))
                           .await?;
        if history.len() <= self.config.max_state_snapshots_per_flow {
            return Ok(());
        }
        // `history` is sorted newest-first; the oldest excess entries are the tail.
        let cutoff = history[self.config.max_state_snapshots_per_flow - 1].inner.created_at;
        self.backend.delete(flow_id, Some(MemoryType::State), Some(cutoff)).await?;
        Ok(())
    }

    pub async fn persist_method_result(&self, flow_id: Uuid, flow_type: &str, flow_version: u64,
                                        method_name: &str, result: Value)
                                        -> Result<(), MemoryError> {
        let mut metadata = HashMap::new();
        metadata.insert("methodName".to_string(), method_name.to_string());
        let bytes = serde_json::to_vec(&result)?;
        let item = FlowMemoryItem::new(flow_id, flow_type, flow_version, MemoryType::MethodResult, bytes)
            .with_metadata(metadata);
        self.backend.insert(item).await
    }

    pub async fn persist_flow_error(&self, flow_id: Uuid, flow_type: &str, flow_version: u64, message: &str,
                                     detail: Value)
                                     -> Result<(), MemoryError> {
        let bytes = serde_json::to_vec(&detail)?;
        let mut metadata = HashMap::new();
        metadata.insert("message".to_string(), message.to_string());
        let item = FlowMemoryItem::new(flow_id, flow_type, flow_version, MemoryType::Error, bytes)
            .with_metadata(metadata);
        self.backend.insert(item).await
    }

    pub async fn persist_flow_config(&self, flow_id: Uuid, flow_type: &str, flow_version: u64, config: Value)
                                      -> Result<(), MemoryError> {
        let bytes = serde_json::to_vec(&config)?;
        let item = FlowMemoryItem::new(flow_id, flow_type, flow_version, MemoryType::Config, bytes);
        self.backend.insert(item).await
    }

    /// Honors the in-memory cache if a value was cached within
    /// `in_memory_cache_ttl`; otherwise queries the backend for the newest
    /// `STATE` item.
    pub async fn get_latest_flow_state(&self, flow_id: Uuid) -> Result<Option<Value>, MemoryError> {
        if let Some(cached) = self.latest_state_cache.get(&flow_id) {
            if cached.cached_at.elapsed() <= self.config.in_memory_cache_ttl {
                return Ok(Some(cached.value.clone()));
            }
        }

        let mut results = self.backend
                               .query(MemoryQuery::new(flow_id).with_type(MemoryType::State).with_limit(1))
                               .await?;
        match results.pop() {
            Some(item) => {
                let value: Value = serde_json::from_slice(item.content())?;
                self.latest_state_cache.insert(flow_id, CachedState { value: value.clone(), cached_at: Instant::now() });
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn get_flow_state_history(&self, flow_id: Uuid, before: Option<DateTime<Utc>>, limit: Option<usize>)
                                         -> Result<Vec<FlowMemoryItem>, MemoryError> {
        let mut query = MemoryQuery::new(flow_id).with_type(MemoryType::State);
        if let Some(before) = before {
            query = query.before(before);
        }
        if let Some(limit) = limit {
            query = query.with_limit(limit);
        }
        self.backend.query(query).await
    }

    pub async fn get_method_results(&self, flow_id: Uuid, before: Option<DateTime<Utc>>, limit: Option<usize>)
                                     -> Result<Vec<FlowMemoryItem>, MemoryError> {
        let mut query = MemoryQuery::new(flow_id).with_type(MemoryType::MethodResult);
        if let Some(before) = before {
            query = query.before(before);
        }
        if let Some(limit) = limit {
            query = query.with_limit(limit);
        }
        self.backend.query(query).await
    }

    pub async fn get_flow_errors(&self, flow_id: Uuid, before: Option<DateTime<Utc>>, limit: Option<usize>)
                                  -> Result<Vec<FlowMemoryItem>, MemoryError> {
        let mut query = MemoryQuery::new(flow_id).with_type(MemoryType::Error);
        if let Some(before) = before {
            query = query.before(before);
        }
        if let Some(limit) = limit {
            query = query.with_limit(limit);
        }
        self.backend.query(query).await
    }

    /// Semantic search requires a vector retriever, which the core never
    /// depends on (spec.md §1: embedders are external collaborators). No
    /// retriever is wired in by default, so this always fails; a caller
    /// providing one would do so through a higher-level adapter outside
    /// this crate's scope.
    pub async fn search_flow_data(&self, _query: &str, _flow_id: Uuid) -> Result<Vec<FlowMemoryItem>, MemoryError> {
        Err(MemoryError::UnsupportedQuery)
    }

    pub async fn clear_flow_data(&self, flow_id: Uuid, memory_type: Option<MemoryType>,
                                  older_than: Option<DateTime<Utc>>)
                                  -> Result<usize, MemoryError> {
        let removed = self.backend.delete(flow_id, memory_type, older_than).await?;
        if memory_type.is_none() || memory_type == Some(MemoryType::State) {
            self.latest_state_cache.remove(&flow_id);
        }
        Ok(removed)
    }
}
