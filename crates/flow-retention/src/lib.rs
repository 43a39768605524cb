//! Bounded memory substrate: pluggable retention policies plus a
//! content-addressed, deduplicated byte store, both used by `flow-memory`
//! to keep persisted flow state, results, and errors from growing without
//! bound.

pub mod bloom;
pub mod dedup;
pub mod errors;
pub mod item;
pub mod policy;

pub use bloom::BloomFilter;
pub use dedup::{DedupStats, DeduplicatedContent, HashAlgorithm};
pub use errors::RetentionError;
pub use item::{MemoryItem, RetainableItem};
pub use policy::{AgeField, CompositeOp, CompositePolicy, CountBasedPolicy, CountOrder, MetadataBasedPolicy,
                  RelevanceBasedPolicy, RetentionPolicy, TimeBasedPolicy};
