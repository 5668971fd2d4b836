//! Cache key generation.
//!
//! Keys are `prefix + "_" + digest`, where the digest covers a canonical
//! rendering of the parameters: object keys sorted at every depth, arrays kept
//! in order, serialized compactly.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Number of digest bytes kept in a key (rendered as twice as many hex chars).
const DIGEST_BYTES: usize = 16;

// == Generate Key ==
/// Derives a deterministic cache key from an operation prefix and parameters.
///
/// Two parameter sets that only differ in map insertion order produce the
/// same key.
pub fn generate_key<P>(prefix: &str, params: &P) -> Result<String>
where
    P: Serialize + ?Sized,
{
    let canonical = canonicalize(serde_json::to_value(params)?);
    let encoded = serde_json::to_string(&canonical)?;
    Ok(format!("{prefix}_{}", hash_params(&encoded)))
}

// == Canonicalize ==
/// Rebuilds a JSON value with every object's keys in lexicographic order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::with_capacity(pairs.len());
            for (key, inner) in pairs {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn hash_params(encoded: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(&hasher.finalize()[..DIGEST_BYTES])
}
