// Provenance audit stream: an append-only hash chain over flushed batches.
// Every event links to its predecessor through
// event_hash = sha256(previous_hash || canonical_json(body)).

use crate::{
    crypto::{sha256, Hash},
    time::TimestampMicros,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasError {
    #[error("Event body serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Chain break at event {index}: expected previous {expected}, found {found}")]
    ChainBreak {
        index: usize,
        expected: Hash,
        found: Hash,
    },
    #[error("Event {index} hash mismatch")]
    HashMismatch { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasTable {
    pub name: String,
    pub rows: u64,
    pub checksum: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasBatch {
    pub ledger_start: u32,
    pub ledger_end: u32,
    pub tables: Vec<PasTable>,
    pub manifest_hash: Hash,
    pub duration_ms: u64,
}

// The hashed portion of an event. Kept separate so the chain hash is
// computed over exactly these fields and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasBody {
    pub timestamp: TimestampMicros,
    pub producer: String,
    pub batch: PasBatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasEvent {
    pub previous_hash: Hash,
    pub event_hash: Hash,
    #[serde(flatten)]
    pub body: PasBody,
}

impl PasEvent {
    // Build and hash a new chain link on top of `previous_hash`
    pub fn seal(previous_hash: Hash, body: PasBody) -> Result<Self, PasError> {
        let event_hash = chain_hash(&previous_hash, &body)?;
        Ok(Self {
            previous_hash,
            event_hash,
            body,
        })
    }

    pub fn verify(&self) -> Result<bool, PasError> {
        Ok(chain_hash(&self.previous_hash, &self.body)? == self.event_hash)
    }
}

fn chain_hash(previous_hash: &Hash, body: &PasBody) -> Result<Hash, PasError> {
    let json = serde_json::to_value(body)?;
    let mut material = Vec::with_capacity(512);
    material.extend_from_slice(previous_hash.as_bytes());
    material.extend_from_slice(canonical_json(&json).as_bytes());
    Ok(sha256(&material))
}

// Deterministic JSON rendering: object keys sorted, no whitespace.
// serde_json's default map ordering is insertion order, which would make
// the chain hash depend on struct field order across versions.
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

// Manifest hash over the sorted (file, checksum) pairs of a committed
// partition set. Shared by the flusher (sealing) and the resolver
// (strict verification).
pub fn manifest_hash(files: &[(String, Hash)]) -> Hash {
    let mut sorted: Vec<&(String, Hash)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut material = String::new();
    for (file, checksum) in sorted {
        material.push_str(file);
        material.push(':');
        material.push_str(&checksum.to_hex());
        material.push('\n');
    }
    sha256(material.as_bytes())
}

// Walk a chain in order, starting from `genesis`, and fail on the first
// broken or forged link.
pub fn verify_chain(genesis: &Hash, events: &[PasEvent]) -> Result<(), PasError> {
    let mut expected = genesis.clone();
    for (index, event) in events.iter().enumerate() {
        if event.previous_hash != expected {
            return Err(PasError::ChainBreak {
                index,
                expected,
                found: event.previous_hash.clone(),
            });
        }
        if !event.verify()? {
            return Err(PasError::HashMismatch { index });
        }
        expected = event.event_hash.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAS_GENESIS_HASH;

    fn batch(start: u32, end: u32) -> PasBatch {
        PasBatch {
            ledger_start: start,
            ledger_end: end,
            tables: vec![PasTable {
                name: "operations".to_owned(),
                rows: 10,
                checksum: sha256(b"file"),
            }],
            manifest_hash: manifest_hash(&[("part-1".to_owned(), sha256(b"file"))]),
            duration_ms: 12,
        }
    }

    fn body(start: u32, end: u32) -> PasBody {
        PasBody {
            timestamp: 1_700_000_000_000_000,
            producer: "flusher".to_owned(),
            batch: batch(start, end),
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value: JsonValue = serde_json::json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn test_chain_verifies() {
        let first = PasEvent::seal(PAS_GENESIS_HASH, body(1, 10)).unwrap();
        let second = PasEvent::seal(first.event_hash.clone(), body(11, 20)).unwrap();
        verify_chain(&PAS_GENESIS_HASH, &[first, second]).unwrap();
    }

    #[test]
    fn test_chain_break_detected() {
        let first = PasEvent::seal(PAS_GENESIS_HASH, body(1, 10)).unwrap();
        let forged = PasEvent::seal(sha256(b"elsewhere"), body(11, 20)).unwrap();
        let err = verify_chain(&PAS_GENESIS_HASH, &[first, forged]).unwrap_err();
        assert!(matches!(err, PasError::ChainBreak { index: 1, .. }));
    }

    #[test]
    fn test_tampered_body_detected() {
        let mut event = PasEvent::seal(PAS_GENESIS_HASH, body(1, 10)).unwrap();
        event.body.batch.ledger_end = 11;
        let err = verify_chain(&PAS_GENESIS_HASH, &[event]).unwrap_err();
        assert!(matches!(err, PasError::HashMismatch { index: 0 }));
    }

    #[test]
    fn test_manifest_hash_is_order_insensitive() {
        let a = manifest_hash(&[
            ("part-2".to_owned(), sha256(b"two")),
            ("part-1".to_owned(), sha256(b"one")),
        ]);
        let b = manifest_hash(&[
            ("part-1".to_owned(), sha256(b"one")),
            ("part-2".to_owned(), sha256(b"two")),
        ]);
        assert_eq!(a, b);
    }
}
