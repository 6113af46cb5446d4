//! Hashing System - SHA-256 for Run Manifests
//!
//! A run manifest carries the PDF digest plus a job hash that identifies
//! which template and card numbers produced it.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::ledger::Allocation;
use crate::templates::CardTemplate;

pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Canonical JSON: object keys sorted at every depth, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(v))
}

fn sort_value(v: Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_value).collect()),
        other => other,
    }
}

pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(manifest)?;
    Ok(sha256_hex(canonical.as_bytes()))
}

/// job_hash = sha256(canonical_template : first-last : engine_version)
pub fn compute_job_hash(
    template: &CardTemplate,
    allocation: &Allocation,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let canonical_template = canonical_json(template)?;
    let combined = format!(
        "{}:{}-{}:{}",
        canonical_template, allocation.first, allocation.last, engine_version
    );
    Ok(sha256_hex(combined.as_bytes()))
}
