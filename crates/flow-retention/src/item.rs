//! The item shape retention policies reason about.
//!
//! `flow-memory`'s `FlowMemoryItem` carries additional flow-specific fields
//! but satisfies `RetainableItem` by delegating to an embedded `MemoryItem`,
//! so retention policies never need to know about flows.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Accessors retention policies need. Implemented by `MemoryItem` directly;
/// richer item types (e.g. `flow-memory`'s `FlowMemoryItem`) implement it by
/// delegation.
pub trait RetainableItem {
    fn created_at(&self) -> DateTime<Utc>;
    fn last_accessed_at(&self) -> DateTime<Utc>;
    fn metadata(&self) -> &HashMap<String, String>;
    /// `None` if the item carries no relevance score (relevance-based
    /// policies then treat it as always above threshold).
    fn relevance_score(&self) -> Option<f64>;
}

/// A generic piece of retained content: bytes or string payload, free-form
/// metadata, and the two timestamps every retention policy can reason
/// about.
#[derive(Debug, Clone)]
pub struct MemoryItem {
    pub id: String,
    pub content: Vec<u8>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub relevance_score: Option<f64>,
}

impl MemoryItem {
    pub fn new(id: impl Into<String>, content: Vec<u8>) -> Self {
        let now = Utc::now();
        Self { id: id.into(), content, metadata: HashMap::new(), created_at: now, last_accessed_at: now,
               relevance_score: None }
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
    }
}

impl RetainableItem for MemoryItem {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    fn relevance_score(&self) -> Option<f64> {
        self.relevance_score
    }
}
