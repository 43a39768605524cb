//! Hash helpers, encapsulated so the algorithm can change without touching
//! call sites. BLAKE3 is used for its speed; callers never depend on the
//! specific hex width or algorithm beyond "stable string in, stable hex
//! string out".

use crate::hashing::to_canonical_json;
use blake3::Hasher;
use serde_json::Value;

pub fn hash_str(input: &str) -> String {
    let mut h = Hasher::new();
    h.update(input.as_bytes());
    h.finalize().to_hex().to_string()
}

pub fn hash_bytes(input: &[u8]) -> String {
    let mut h = Hasher::new();
    h.update(input);
    h.finalize().to_hex().to_string()
}

/// Canonicalizes `v` before hashing so structurally-equal values hash the
/// same regardless of object key order.
pub fn hash_value(v: &Value) -> String {
    let canonical = to_canonical_json(v);
    hash_str(&canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_value_is_stable_under_key_reordering() {
        let a = json!({"x": 1, "y": 2});
        let b = json!({"y": 2, "x": 1});
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn hash_bytes_matches_hash_str_for_utf8() {
        assert_eq!(hash_str("abc"), hash_bytes(b"abc"));
    }
}
