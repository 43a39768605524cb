//! Hashing and JSON canonicalization.
//!
//! Deterministic replay and fingerprinting both depend on stable
//! serialization: `to_canonical_json` gives every value one textual form,
//! and `hash_str`/`hash_value`/`hash_bytes` turn that form into a stable
//! identifier reused for method fingerprints, flow fingerprints, and
//! content-addressed storage keys.

pub mod canonical_json;
pub mod hash;

pub use canonical_json::to_canonical_json;
pub use hash::{hash_bytes, hash_str, hash_value};
