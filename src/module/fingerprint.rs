// src/module/fingerprint.rs

//! Content fingerprints used for duplicate-run detection.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::module::params::Parameters;

/// Compute the fingerprint of a module configuration.
///
/// The input is the canonical JSON serialisation of
/// `{basename, codeVersionHash, parameters}`. Object keys are sorted at every
/// level, so two parameter sets that differ only in insertion order produce
/// the same fingerprint. The digest is SHA-256, hex encoded.
pub fn fingerprint(basename: &str, code_version_hash: &str, params: &Parameters) -> String {
    let document = json!({
        "basename": basename,
        "codeVersionHash": code_version_hash,
        "parameters": params.to_value(),
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&document).as_bytes());
    hex::encode(hasher.finalize())
}

/// Serialise a JSON value with object keys sorted.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_json)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{body}]")
        }
        scalar => scalar.to_string(),
    }
}
