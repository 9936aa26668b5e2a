use crate::time::{format_rfc3339, get_current_time_in_micros};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Checkpoint parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Checkpoint regression: {current} -> {attempted}")]
    Regression { current: u64, attempted: u64 },
}

// Durable flush progress of one dataset. The value only moves forward;
// the flusher is the single writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_ledger: u64,
    pub last_updated: String,
}

impl Checkpoint {
    pub fn new(last_ledger: u64) -> Self {
        Self {
            last_ledger,
            last_updated: format_rfc3339(get_current_time_in_micros()),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, CheckpointError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Atomic write: temp file in the same directory, then rename over the
    // destination so readers never observe a torn checkpoint.
    pub fn store(&self, path: &Path) -> Result<(), CheckpointError> {
        let tmp: PathBuf = path.with_extension("json.tmp");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn advance(&mut self, ledger: u64) -> Result<(), CheckpointError> {
        if ledger < self.last_ledger {
            return Err(CheckpointError::Regression {
                current: self.last_ledger,
                attempted: ledger,
            });
        }

        self.last_ledger = ledger;
        self.last_updated = format_rfc3339(get_current_time_in_micros());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_store_load_roundtrip() {
        let dir = TempDir::new("checkpoint").unwrap();
        let path = dir.path().join("operations.json");

        let checkpoint = Checkpoint::new(120);
        checkpoint.store(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn test_load_missing_returns_none() {
        let dir = TempDir::new("checkpoint").unwrap();
        assert!(Checkpoint::load(&dir.path().join("nope.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_advance_rejects_regression() {
        let mut checkpoint = Checkpoint::new(50);
        checkpoint.advance(50).unwrap();
        checkpoint.advance(51).unwrap();
        assert!(checkpoint.advance(10).is_err());
        assert_eq!(checkpoint.last_ledger, 51);
    }

    #[test]
    fn test_store_overwrites_atomically() {
        let dir = TempDir::new("checkpoint").unwrap();
        let path = dir.path().join("accounts.json");

        Checkpoint::new(10).store(&path).unwrap();
        Checkpoint::new(20).store(&path).unwrap();

        let loaded = Checkpoint::load(&path).unwrap().unwrap();
        assert_eq!(loaded.last_ledger, 20);
        // No stray temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }
}
