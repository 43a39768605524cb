//! Content-addressed byte storage with reference counting and optional
//! chunk-level deduplication.
//!
//! `store` hashes the incoming bytes (SHA-256 by default — `flow-core`'s
//! BLAKE3 canonical hasher is offered as the fast non-cryptographic
//! alternative) and stores the blob at most once per distinct hash; every
//! `store` call returns a fresh reference id that maps to that hash.
//! `remove` drops a reference and deletes the blob once its refcount hits
//! zero. A `BloomFilter` accelerates the common case of "this content has
//! never been seen" without a hash-map probe.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::bloom::BloomFilter;
use crate::errors::RetentionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Blake3,
}

fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Blake3 => flow_core::hashing::hash_bytes(bytes),
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DedupStats {
    pub total_items: u64,
    pub unique_contents: u64,
    pub total_size_bytes: u64,
    pub dedup_savings_bytes: u64,
    pub retrievals: u64,
    pub stores: u64,
}

struct ContentEntry {
    bytes: Vec<u8>,
    refcount: u64,
}

enum ReferenceRecord {
    Whole(String),
    Chunked(Vec<String>),
}

struct Inner {
    contents: HashMap<String, ContentEntry>,
    references: HashMap<String, ReferenceRecord>,
    stats: DedupStats,
}

/// A content-addressed store with refcounted blobs. Safe to share across
/// threads: `store`/`remove` serialize through an internal mutex (per the
/// single-writer discipline required to keep refcounts consistent);
/// `retrieve` only reads.
pub struct DeduplicatedContent {
    inner: Mutex<Inner>,
    bloom: BloomFilter,
    algorithm: HashAlgorithm,
    chunk_size: Option<usize>,
}

impl DeduplicatedContent {
    pub fn new(algorithm: HashAlgorithm, chunk_size: Option<usize>, expected_items: usize) -> Self {
        Self { inner: Mutex::new(Inner { contents: HashMap::new(),
                                         references: HashMap::new(),
                                         stats: DedupStats::default() }),
               bloom: BloomFilter::new(expected_items.max(16), 0.01),
               algorithm,
               chunk_size }
    }

    /// Stores `bytes`, returning a fresh reference id. Identical content
    /// stored under a different reference id shares the same underlying
    /// blob and refcount.
    pub fn store(&self, bytes: &[u8], id: Option<String>) -> Result<String, RetentionError> {
        let reference_id = match id {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let mut inner = self.inner.lock();
        if inner.references.contains_key(&reference_id) {
            return Err(RetentionError::DuplicateReference(reference_id));
        }

        let record = match self.chunk_size {
            Some(chunk_size) if bytes.len() > chunk_size => {
                let hashes: Vec<String> =
                    bytes.chunks(chunk_size).map(|chunk| self.intern_chunk(&mut inner, chunk)).collect();
                ReferenceRecord::Chunked(hashes)
            }
            _ => {
                let hash = self.intern_chunk(&mut inner, bytes);
                ReferenceRecord::Whole(hash)
            }
        };

        inner.references.insert(reference_id.clone(), record);
        inner.stats.total_items += 1;
        inner.stats.stores += 1;
        Ok(reference_id)
    }

    /// Interns one chunk (or the whole blob, for unchunked stores), hashing
    /// it, checking the Bloom filter first, and either bumping an existing
    /// entry's refcount or inserting a new one.
    fn intern_chunk(&self, inner: &mut Inner, bytes: &[u8]) -> String {
        let hash = hash_bytes(self.algorithm, bytes);

        if self.bloom.contains(&hash) {
            if let Some(entry) = inner.contents.get_mut(&hash) {
                entry.refcount += 1;
                inner.stats.dedup_savings_bytes += bytes.len() as u64;
                return hash;
            }
            // Bloom false positive: fall through and insert for real.
        }

        inner.contents.insert(hash.clone(), ContentEntry { bytes: bytes.to_vec(), refcount: 1 });
        inner.stats.unique_contents += 1;
        inner.stats.total_size_bytes += bytes.len() as u64;
        self.bloom.insert(&hash);
        hash
    }

    pub fn retrieve(&self, reference_id: &str) -> Result<Vec<u8>, RetentionError> {
        let mut inner = self.inner.lock();
        let record = inner.references
                          .get(reference_id)
                          .ok_or_else(|| RetentionError::ReferenceNotFound(reference_id.to_string()))?;

        let bytes = match record {
            ReferenceRecord::Whole(hash) => inner.contents
                                                  .get(hash)
                                                  .map(|e| e.bytes.clone())
                                                  .ok_or_else(|| RetentionError::ReferenceNotFound(hash.clone()))?,
            ReferenceRecord::Chunked(hashes) => {
                let mut out = Vec::new();
                for hash in hashes {
                    let chunk =
                        inner.contents
                             .get(hash)
                             .map(|e| e.bytes.clone())
                             .ok_or_else(|| RetentionError::ReferenceNotFound(hash.clone()))?;
                    out.extend_from_slice(&chunk);
                }
                out
            }
        };

        inner.stats.retrievals += 1;
        Ok(bytes)
    }

    /// Decrements the refcount(s) backing `reference_id`, deleting blobs
    /// that drop to zero. Returns `true` if the reference existed.
    pub fn remove(&self, reference_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let record = match inner.references.remove(reference_id) {
            Some(r) => r,
            None => return false,
        };

        let hashes: Vec<String> = match record {
            ReferenceRecord::Whole(hash) => vec![hash],
            ReferenceRecord::Chunked(hashes) => hashes,
        };

        for hash in hashes {
            let mut drop_entry = false;
            if let Some(entry) = inner.contents.get_mut(&hash) {
                entry.refcount = entry.refcount.saturating_sub(1);
                if entry.refcount == 0 {
                    drop_entry = true;
                }
            }
            if drop_entry {
                if let Some(entry) = inner.contents.remove(&hash) {
                    inner.stats.total_size_bytes = inner.stats.total_size_bytes.saturating_sub(entry.bytes.len() as u64);
                    inner.stats.unique_contents = inner.stats.unique_contents.saturating_sub(1);
                }
            }
        }

        true
    }

    pub fn stats(&self) -> DedupStats {
        self.inner.lock().stats.clone()
    }

    /// Sum of live refcounts across every stored content hash — should
    /// always equal the number of live reference ids.
    pub fn total_refcount(&self) -> u64 {
        self.inner.lock().contents.values().map(|e| e.refcount).sum()
    }

    pub fn reference_count(&self) -> usize {
        self.inner.lock().references.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_is_deduplicated() {
        let store = DeduplicatedContent::new(HashAlgorithm::Sha256, None, 16);
        let r1 = store.store(b"hello", None).unwrap();
        let r2 = store.store(b"hello", None).unwrap();

        assert_ne!(r1, r2);
        assert_eq!(store.stats().unique_contents, 1);
        assert_eq!(store.total_refcount(), store.reference_count() as u64);
    }

    #[test]
    fn remove_drops_blob_only_when_refcount_reaches_zero() {
        let store = DeduplicatedContent::new(HashAlgorithm::Sha256, None, 16);
        let r1 = store.store(b"payload", None).unwrap();
        let r2 = store.store(b"payload", None).unwrap();

        assert!(store.remove(&r1));
        assert_eq!(store.retrieve(&r2).unwrap(), b"payload");

        assert!(store.remove(&r2));
        assert!(store.retrieve(&r2).is_err());
        assert_eq!(store.total_refcount(), 0);
    }

    #[test]
    fn chunked_store_reassembles_on_retrieve() {
        let store = DeduplicatedContent::new(HashAlgorithm::Sha256, Some(4), 16);
        let payload = b"0123456789abcdef".to_vec();
        let reference = store.store(&payload, None).unwrap();

        assert_eq!(store.retrieve(&reference).unwrap(), payload);
    }
}
