//! A small bit-array Bloom filter for the dedup store's negative-lookup
//! fast path.
//!
//! Hand-rolled rather than pulled from a crate: the filter itself is the
//! functionality under test here, not infrastructure glue. Uses double
//! hashing (`h1`, `h2`
//! from splitting a single 128-bit hash) to derive `k` index functions
//! without `k` independent hash passes, the standard Kirsch-Mitzenmacher
//! construction.

use std::sync::atomic::{AtomicU64, Ordering};

/// False positives are allowed; false negatives are not. `contains`
/// returning `false` guarantees the value was never `insert`ed.
pub struct BloomFilter {
    bits: Vec<AtomicU64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// `expected_items` and `false_positive_rate` size the filter using the
    /// standard formulas `m = -(n ln p) / (ln 2)^2`, `k = (m/n) ln 2`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-6, 0.5);
        let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil().max(64.0);
        let k = ((m / n) * std::f64::consts::LN_2).round().clamp(1.0, 16.0) as u32;

        let num_bits = m as u64;
        let words = (num_bits as usize).div_ceil(64);
        Self { bits: (0..words).map(|_| AtomicU64::new(0)).collect(), num_bits, num_hashes: k }
    }

    fn indices(&self, hash_hex: &str) -> Vec<u64> {
        let digest = flow_core::hashing::hash_str(hash_hex);
        let bytes = digest.as_bytes();
        let half = bytes.len() / 2;
        let h1 = u64::from_le_bytes(fold_to_8(&bytes[..half]));
        let h2 = u64::from_le_bytes(fold_to_8(&bytes[half..])) | 1; // keep odd, avoids degenerate stride

        (0..self.num_hashes).map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2))) % self.num_bits).collect()
    }

    pub fn insert(&self, key: &str) {
        for idx in self.indices(key) {
            let word = (idx / 64) as usize;
            let bit = idx % 64;
            self.bits[word].fetch_or(1 << bit, Ordering::Relaxed);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.indices(key).into_iter().all(|idx| {
                                          let word = (idx / 64) as usize;
                                          let bit = idx % 64;
                                          self.bits[word].load(Ordering::Relaxed) & (1 << bit) != 0
                                      })
    }
}

fn fold_to_8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, b) in bytes.iter().enumerate() {
        out[i % 8] ^= b;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_false_negative_for_inserted_keys() {
        let filter = BloomFilter::new(1000, 0.01);
        for i in 0..1000 {
            filter.insert(&format!("key-{i}"));
        }
        for i in 0..1000 {
            assert!(filter.contains(&format!("key-{i}")));
        }
    }

    #[test]
    fn absent_key_usually_reported_absent() {
        let filter = BloomFilter::new(100, 0.01);
        filter.insert("present");
        assert!(!filter.contains("definitely-not-present-xyz"));
    }
}
