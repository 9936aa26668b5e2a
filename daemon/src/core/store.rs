use crate::core::error::PipelineError;
use bytes::Bytes;
use futures::TryStreamExt;
use lumenlake_common::{crypto::Hash, time::TimestampMicros};
use object_store::{
    local::LocalFileSystem, memory::InMemory, path::Path as StorePath, ObjectStore, PutPayload,
};
use std::{fs, path::Path, sync::Arc};

pub const PAS_PREFIX: &str = "_pas";
pub const PARTITION_EXT: &str = "parquet";

// Thin wrapper over the lake object store. All paths are relative to the
// lake root; the backend is a local filesystem in the default deployment
// and an in-memory store in tests.
#[derive(Clone)]
pub struct Lake {
    store: Arc<dyn ObjectStore>,
}

impl Lake {
    pub fn local(root: &Path) -> Result<Self, PipelineError> {
        fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
        }
    }

    pub async fn put(&self, path: &str, bytes: Bytes) -> Result<(), PipelineError> {
        let location = StorePath::from(path);
        let payload: PutPayload = bytes.into();
        self.store.put(&location, payload).await?;
        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Bytes, PipelineError> {
        let location = StorePath::from(path);
        let result = self.store.get(&location).await?;
        Ok(result.bytes().await?)
    }

    pub async fn exists(&self, path: &str) -> Result<bool, PipelineError> {
        let location = StorePath::from(path);
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, path: &str) -> Result<(), PipelineError> {
        let location = StorePath::from(path);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // All object paths under a prefix, with sizes; an empty prefix lists
    // the whole lake
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, u64)>, PipelineError> {
        let location = (!prefix.is_empty()).then(|| StorePath::from(prefix));
        let objects: Vec<_> = self.store.list(location.as_ref()).try_collect().await?;
        Ok(objects
            .into_iter()
            .map(|meta| (meta.location.to_string(), meta.size as u64))
            .collect())
    }
}

// {dataset}/ledger_range={R}/part-{snapshot_id}-{uuid}.parquet
pub fn partition_file_path(dataset: &str, ledger_range: u32, snapshot_id: u64) -> String {
    format!(
        "{}/ledger_range={}/part-{}-{}.{}",
        dataset,
        ledger_range,
        snapshot_id,
        uuid::Uuid::new_v4(),
        PARTITION_EXT
    )
}

pub fn partition_prefix(dataset: &str, ledger_range: u32) -> String {
    format!("{}/ledger_range={}", dataset, ledger_range)
}

// {dataset}/_manifest/{snapshot_id}.json
pub fn manifest_path(dataset: &str, snapshot_id: u64) -> String {
    format!("{}/_manifest/{}.json", dataset, snapshot_id)
}

// _pas/pas_{ledger_start}_{ledger_end}_{timestamp}.json
pub fn pas_path(ledger_start: u32, ledger_end: u32, timestamp: TimestampMicros) -> String {
    format!(
        "{}/pas_{}_{}_{}.json",
        PAS_PREFIX, ledger_start, ledger_end, timestamp
    )
}

// Checksums are sha-256 over the raw object bytes
pub fn checksum_bytes(bytes: &[u8]) -> Hash {
    lumenlake_common::crypto::sha256(bytes)
}
