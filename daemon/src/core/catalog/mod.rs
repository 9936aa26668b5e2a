pub mod sql;

use crate::core::error::PipelineError;
use dashmap::DashMap;
use log::{debug, info, trace};
use lumenlake_common::{
    crypto::Hash,
    dataset::Dataset,
    era::Era,
    ledger::{LedgerSequence, ProtocolVersion},
    network::Network,
    time::{get_current_time_in_micros, TimestampMicros},
};
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

const SNAPSHOT_COUNTER_KEY: &[u8] = b"snapshot_id";

// One committed columnar file in the lake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineagePartition {
    pub id: u64,
    pub dataset: String,
    pub era_id: String,
    pub version_label: String,
    pub ledger_start: LedgerSequence,
    pub ledger_end: LedgerSequence,
    pub file_path: String,
    pub checksum: Hash,
    pub row_count: u64,
    pub bytes: u64,
    pub pas_verified: bool,
    // Set when a compaction output replaced this file; it stays readable
    // until expire retires it
    pub superseded_by: Option<u64>,
    // Set by expire; vacuum removes the object and the row afterwards
    pub retired: bool,
    pub created_at: TimestampMicros,
}

impl LineagePartition {
    pub fn is_live(&self) -> bool {
        !self.retired && self.superseded_by.is_none()
    }

    pub fn overlaps(&self, start: LedgerSequence, end: LedgerSequence) -> bool {
        self.ledger_start <= end && start <= self.ledger_end
    }
}

// Fields of a partition append; the catalog assigns bookkeeping state
#[derive(Debug, Clone)]
pub struct NewPartition {
    pub snapshot_id: u64,
    pub dataset: String,
    pub era_id: String,
    pub version_label: String,
    pub ledger_start: LedgerSequence,
    pub ledger_end: LedgerSequence,
    pub file_path: String,
    pub checksum: Hash,
    pub row_count: u64,
    pub bytes: u64,
    pub pas_verified: bool,
}

// Advisory lock on (dataset, ledger_range). Held by the flusher while it
// writes a range and by maintenance while it compacts one; nothing else
// may take these locks.
pub struct PartitionLock<'a> {
    locks: &'a DashMap<(String, LedgerSequence), ()>,
    key: (String, LedgerSequence),
}

impl Drop for PartitionLock<'_> {
    fn drop(&mut self) {
        self.locks.remove(&self.key);
    }
}

// Era map, dataset registry and lineage, backed by sled trees. Writes are
// serialized through sled batch application per tree; the invariants of
// the metadata model are checked before any mutation lands.
pub struct Catalog {
    _db: sled::Db,
    eras: sled::Tree,
    datasets: sled::Tree,
    lineage: sled::Tree,
    lineage_index: sled::Tree,
    meta: sled::Tree,
    locks: DashMap<(String, LedgerSequence), ()>,
    // Bumped on every lineage append; resolver caches key off it
    generation: AtomicU64,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn temporary() -> Result<Self, PipelineError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, PipelineError> {
        let eras = db.open_tree("_meta_eras")?;
        let datasets = db.open_tree("_meta_datasets")?;
        let lineage = db.open_tree("_meta_lineage")?;
        let lineage_index = db.open_tree("_meta_lineage_index")?;
        let meta = db.open_tree("_meta")?;
        Ok(Self {
            _db: db,
            eras,
            datasets,
            lineage,
            lineage_index,
            meta,
            locks: DashMap::new(),
            generation: AtomicU64::new(0),
        })
    }

    // ---- datasets ----

    pub fn upsert_dataset(&self, dataset: &Dataset) -> Result<(), PipelineError> {
        let value = serde_json::to_vec(dataset)?;
        self.datasets.insert(dataset.name.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_dataset(&self, name: &str) -> Result<Dataset, PipelineError> {
        match self.datasets.get(name.as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(PipelineError::DatasetNotFound(name.to_owned())),
        }
    }

    pub fn list_datasets(&self) -> Result<Vec<Dataset>, PipelineError> {
        let mut datasets = Vec::new();
        for item in self.datasets.iter() {
            let (_, value) = item?;
            datasets.push(serde_json::from_slice(&value)?);
        }
        Ok(datasets)
    }

    // ---- eras ----

    // Register a new era. At most one active era per network; era ids are
    // unique; an active era must not coexist with another active one.
    pub fn register_era(&self, era: &Era) -> Result<(), PipelineError> {
        if self.eras.contains_key(era.era_id.as_bytes())? {
            return Err(PipelineError::EraOverlap(era.era_id.clone()));
        }
        if era.is_active() {
            if let Ok(active) = self.active_era(era.network) {
                return Err(PipelineError::EraOverlap(active.era_id));
            }
        }

        let value = serde_json::to_vec(era)?;
        self.eras.insert(era.era_id.as_bytes(), value)?;
        info!(
            "registered era {} for {} starting at ledger {}",
            era.era_id, era.network, era.ledger_start
        );
        Ok(())
    }

    pub fn get_era(&self, era_id: &str) -> Result<Era, PipelineError> {
        match self.eras.get(era_id.as_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(PipelineError::EraNotFound(era_id.to_owned())),
        }
    }

    pub fn list_eras(&self, network: Network) -> Result<Vec<Era>, PipelineError> {
        let mut eras = Vec::new();
        for item in self.eras.iter() {
            let (_, value) = item?;
            let era: Era = serde_json::from_slice(&value)?;
            if era.network == network {
                eras.push(era);
            }
        }
        eras.sort_by_key(|era| era.ledger_start);
        Ok(eras)
    }

    pub fn active_era(&self, network: Network) -> Result<Era, PipelineError> {
        self.list_eras(network)?
            .into_iter()
            .find(Era::is_active)
            .ok_or(PipelineError::NoActiveEra(network))
    }

    pub fn lookup_era_by_ledger(
        &self,
        network: Network,
        ledger: LedgerSequence,
    ) -> Result<Era, PipelineError> {
        let mut candidates: Vec<Era> = self
            .list_eras(network)?
            .into_iter()
            .filter(|era| era.covers_ledger(ledger))
            .collect();
        // Tie-break by highest version label
        candidates.sort_by(|a, b| b.version_label.cmp(&a.version_label));
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::EraNotFound(format!("ledger {}", ledger)))
    }

    pub fn lookup_era_by_protocol(
        &self,
        network: Network,
        protocol: ProtocolVersion,
    ) -> Result<Era, PipelineError> {
        let mut candidates: Vec<Era> = self
            .list_eras(network)?
            .into_iter()
            .filter(|era| era.covers_protocol(protocol))
            .collect();
        candidates.sort_by(|a, b| b.version_label.cmp(&a.version_label));
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::EraNotFound(format!("protocol {}", protocol)))
    }

    pub fn freeze_era(
        &self,
        era_id: &str,
        ledger_end: LedgerSequence,
    ) -> Result<Era, PipelineError> {
        let mut era = self.get_era(era_id)?;
        era.freeze(ledger_end, get_current_time_in_micros());
        let value = serde_json::to_vec(&era)?;
        self.eras.insert(era.era_id.as_bytes(), value)?;
        info!("froze era {} at ledger {}", era_id, ledger_end);
        Ok(era)
    }

    // Bump the version label of an era for a re-ingestion run. The prior
    // version's partitions stay in lineage untouched.
    pub fn set_era_version(&self, era_id: &str, version_label: &str) -> Result<Era, PipelineError> {
        let mut era = self.get_era(era_id)?;
        era.version_label = version_label.to_owned();
        let value = serde_json::to_vec(&era)?;
        self.eras.insert(era.era_id.as_bytes(), value)?;
        info!("era {} now ingesting under version {}", era_id, version_label);
        Ok(era)
    }

    // Widen the protocol window of an era as new ledgers arrive
    pub fn observe_protocol(
        &self,
        era_id: &str,
        protocol: ProtocolVersion,
    ) -> Result<(), PipelineError> {
        let mut era = self.get_era(era_id)?;
        let changed = match (era.protocol_min, era.protocol_max) {
            (Some(min), Some(max)) => {
                era.protocol_min = Some(min.min(protocol));
                era.protocol_max = Some(max.max(protocol));
                protocol < min || protocol > max
            }
            _ => {
                era.protocol_min = Some(protocol);
                era.protocol_max = Some(protocol);
                true
            }
        };
        if changed {
            let value = serde_json::to_vec(&era)?;
            self.eras.insert(era.era_id.as_bytes(), value)?;
        }
        Ok(())
    }

    pub fn set_pas_chain_head(&self, era_id: &str, head: Hash) -> Result<(), PipelineError> {
        let mut era = self.get_era(era_id)?;
        era.pas_chain_head = Some(head);
        let value = serde_json::to_vec(&era)?;
        self.eras.insert(era.era_id.as_bytes(), value)?;
        Ok(())
    }

    // ---- snapshot ids ----

    // Monotone counter backing snapshot ids and partition file names.
    // Reserved ids that never commit simply leave gaps.
    pub fn reserve_snapshot_id(&self) -> Result<u64, PipelineError> {
        let value = self.meta.update_and_fetch(SNAPSHOT_COUNTER_KEY, |old| {
            let next = match old {
                Some(bytes) => u64::from_be_bytes(bytes.try_into().unwrap_or([0; 8])) + 1,
                None => 1,
            };
            Some(next.to_be_bytes().to_vec())
        })?;
        let id = value
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0; 8])))
            .unwrap_or(1);
        Ok(id)
    }

    pub fn max_snapshot_id(&self) -> Result<u64, PipelineError> {
        Ok(self
            .meta
            .get(SNAPSHOT_COUNTER_KEY)?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0; 8])))
            .unwrap_or(0))
    }

    // ---- lineage ----

    fn index_key(
        dataset: &str,
        era_id: &str,
        version_label: &str,
        ledger_start: LedgerSequence,
        ledger_end: LedgerSequence,
    ) -> Vec<u8> {
        format!(
            "{}|{}|{}|{}|{}",
            dataset, era_id, version_label, ledger_start, ledger_end
        )
        .into_bytes()
    }

    // The committed partition covering exactly this range, if any. This
    // is the idempotence key of the flush commit: a retried commit whose
    // upload got a fresh file name still resolves here. Retired rows do
    // not count; a stale index entry is cleaned up lazily.
    pub fn find_partition(
        &self,
        dataset: &str,
        era_id: &str,
        version_label: &str,
        ledger_start: LedgerSequence,
        ledger_end: LedgerSequence,
    ) -> Result<Option<LineagePartition>, PipelineError> {
        let index_key = Self::index_key(dataset, era_id, version_label, ledger_start, ledger_end);
        let Some(id_bytes) = self.lineage_index.get(&index_key)? else {
            return Ok(None);
        };

        let id = u64::from_be_bytes(id_bytes.as_ref().try_into().unwrap_or([0; 8]));
        match self.get_partition(id) {
            Ok(partition) if !partition.retired => Ok(Some(partition)),
            Ok(_) => Ok(None),
            Err(PipelineError::NotFound(_)) => {
                // Row vacuumed but the index entry survived a crash
                self.lineage_index.remove(&index_key)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // Append one committed partition. Idempotent upsert on
    // (dataset, era_id, version_label, ledger_start, ledger_end):
    // re-running a commit that already landed returns the existing
    // snapshot id and changes nothing, even when the retry uploaded under
    // a different file name. Overlap against live partitions of the same
    // (dataset, era_id, version_label) is an invariant violation.
    pub fn append_lineage(&self, new: NewPartition) -> Result<u64, PipelineError> {
        if let Some(existing) = self.find_partition(
            &new.dataset,
            &new.era_id,
            &new.version_label,
            new.ledger_start,
            new.ledger_end,
        )? {
            trace!(
                "lineage upsert hit existing id {} for [{}, {}]",
                existing.id,
                new.ledger_start,
                new.ledger_end
            );
            return Ok(existing.id);
        }

        let index_key = Self::index_key(
            &new.dataset,
            &new.era_id,
            &new.version_label,
            new.ledger_start,
            new.ledger_end,
        );

        for partition in self.list_partitions(&new.dataset, Some(&new.era_id), None)? {
            if partition.version_label == new.version_label
                && partition.overlaps(new.ledger_start, new.ledger_end)
            {
                return Err(PipelineError::PartitionOverlap {
                    dataset: new.dataset,
                    era_id: new.era_id,
                    version_label: new.version_label,
                    ledger_start: new.ledger_start,
                    ledger_end: new.ledger_end,
                });
            }
        }

        let partition = LineagePartition {
            id: new.snapshot_id,
            dataset: new.dataset,
            era_id: new.era_id,
            version_label: new.version_label,
            ledger_start: new.ledger_start,
            ledger_end: new.ledger_end,
            file_path: new.file_path,
            checksum: new.checksum,
            row_count: new.row_count,
            bytes: new.bytes,
            pas_verified: new.pas_verified,
            superseded_by: None,
            retired: false,
            created_at: get_current_time_in_micros(),
        };

        self.lineage.insert(
            partition.id.to_be_bytes(),
            serde_json::to_vec(&partition)?,
        )?;
        self.lineage_index
            .insert(index_key, partition.id.to_be_bytes().to_vec())?;
        self.generation.fetch_add(1, Ordering::SeqCst);

        debug!(
            "lineage append: {} [{}, {}] id {} ({} rows)",
            partition.dataset,
            partition.ledger_start,
            partition.ledger_end,
            partition.id,
            partition.row_count
        );
        Ok(partition.id)
    }

    // Compaction commit: record the merged output and mark its inputs
    // superseded, so the overlap invariant holds over the live set.
    pub fn append_compacted(
        &self,
        inputs: &[u64],
        new: NewPartition,
    ) -> Result<u64, PipelineError> {
        let output_id = new.snapshot_id;
        for input in inputs {
            let mut partition = self.get_partition(*input)?;
            partition.superseded_by = Some(output_id);
            self.lineage
                .insert(partition.id.to_be_bytes(), serde_json::to_vec(&partition)?)?;
        }
        self.append_lineage(new)
    }

    pub fn get_partition(&self, id: u64) -> Result<LineagePartition, PipelineError> {
        match self.lineage.get(id.to_be_bytes())? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(PipelineError::NotFound(format!("partition {}", id))),
        }
    }

    // Live partitions of a dataset, ordered by snapshot id. `era_id` and
    // `version_label` filter when given.
    pub fn list_partitions(
        &self,
        dataset: &str,
        era_id: Option<&str>,
        version_label: Option<&str>,
    ) -> Result<Vec<LineagePartition>, PipelineError> {
        let mut partitions = Vec::new();
        for item in self.lineage.iter() {
            let (_, value) = item?;
            let partition: LineagePartition = serde_json::from_slice(&value)?;
            if partition.dataset != dataset || !partition.is_live() {
                continue;
            }
            if let Some(era) = era_id {
                if partition.era_id != era {
                    continue;
                }
            }
            if let Some(version) = version_label {
                if partition.version_label != version {
                    continue;
                }
            }
            partitions.push(partition);
        }
        partitions.sort_by_key(|p| p.id);
        Ok(partitions)
    }

    // Every partition row including superseded and retired ones
    pub fn list_all_partitions(&self) -> Result<Vec<LineagePartition>, PipelineError> {
        let mut partitions = Vec::new();
        for item in self.lineage.iter() {
            let (_, value) = item?;
            partitions.push(serde_json::from_slice(&value)?);
        }
        Ok(partitions)
    }

    pub fn mark_pas_verified(&self, id: u64) -> Result<(), PipelineError> {
        let mut partition = self.get_partition(id)?;
        partition.pas_verified = true;
        self.lineage
            .insert(partition.id.to_be_bytes(), serde_json::to_vec(&partition)?)?;
        Ok(())
    }

    pub fn mark_retired(&self, id: u64) -> Result<(), PipelineError> {
        let mut partition = self.get_partition(id)?;
        partition.retired = true;
        self.lineage
            .insert(partition.id.to_be_bytes(), serde_json::to_vec(&partition)?)?;
        Ok(())
    }

    pub fn remove_partition(&self, id: u64) -> Result<(), PipelineError> {
        if let Ok(partition) = self.get_partition(id) {
            let index_key = Self::index_key(
                &partition.dataset,
                &partition.era_id,
                &partition.version_label,
                partition.ledger_start,
                partition.ledger_end,
            );
            // A newer partition may have taken over this range key after
            // the row was retired; only drop the entry we still own
            if let Some(id_bytes) = self.lineage_index.get(&index_key)? {
                let indexed = u64::from_be_bytes(id_bytes.as_ref().try_into().unwrap_or([0; 8]));
                if indexed == partition.id {
                    self.lineage_index.remove(index_key)?;
                }
            }
            self.lineage.remove(partition.id.to_be_bytes())?;
        }
        Ok(())
    }

    // ---- locks & cache generation ----

    pub fn try_lock_partition(
        &self,
        dataset: &str,
        ledger_range: LedgerSequence,
    ) -> Result<PartitionLock<'_>, PipelineError> {
        let key = (dataset.to_owned(), ledger_range);
        match self.locks.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(PipelineError::PartitionLocked {
                dataset: dataset.to_owned(),
                range: ledger_range,
            }),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(PartitionLock {
                    locks: &self.locks,
                    key,
                })
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> Result<(), PipelineError> {
        self.eras.flush()?;
        self.datasets.flush()?;
        self.lineage.flush()?;
        self.lineage_index.flush()?;
        self.meta.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::{crypto::sha256, era::EraStatus};

    fn era(era_id: &str, start: u32, end: Option<u32>, version: &str) -> Era {
        Era {
            era_id: era_id.to_owned(),
            network: Network::Mainnet,
            version_label: version.to_owned(),
            ledger_start: start,
            ledger_end: end,
            protocol_min: None,
            protocol_max: None,
            status: if end.is_some() {
                EraStatus::Frozen
            } else {
                EraStatus::Active
            },
            schema_epoch: 1,
            pas_chain_head: None,
            created_at: 0,
            frozen_at: None,
        }
    }

    fn partition(catalog: &Catalog, start: u32, end: u32, file: &str) -> NewPartition {
        NewPartition {
            snapshot_id: catalog.reserve_snapshot_id().unwrap(),
            dataset: "operations".to_owned(),
            era_id: "mainnet-001".to_owned(),
            version_label: "v1".to_owned(),
            ledger_start: start,
            ledger_end: end,
            file_path: file.to_owned(),
            checksum: sha256(file.as_bytes()),
            row_count: 10,
            bytes: 1000,
            pas_verified: false,
        }
    }

    #[test]
    fn test_single_active_era_per_network() {
        let catalog = Catalog::temporary().unwrap();
        catalog.register_era(&era("mainnet-001", 1, None, "v1")).unwrap();
        let err = catalog
            .register_era(&era("mainnet-002", 100, None, "v1"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EraOverlap(_)));
    }

    #[test]
    fn test_era_lookup_across_boundary() {
        let catalog = Catalog::temporary().unwrap();
        catalog
            .register_era(&era("mainnet-001", 1, Some(99), "v1"))
            .unwrap();
        catalog.register_era(&era("mainnet-002", 100, None, "v1")).unwrap();

        let e1 = catalog.lookup_era_by_ledger(Network::Mainnet, 99).unwrap();
        assert_eq!(e1.era_id, "mainnet-001");
        let e2 = catalog.lookup_era_by_ledger(Network::Mainnet, 100).unwrap();
        assert_eq!(e2.era_id, "mainnet-002");
    }

    #[test]
    fn test_freeze_era_allows_a_successor() {
        let catalog = Catalog::temporary().unwrap();
        catalog.register_era(&era("mainnet-001", 1, None, "v1")).unwrap();

        let frozen = catalog.freeze_era("mainnet-001", 99).unwrap();
        assert_eq!(frozen.ledger_end, Some(99));
        assert_eq!(frozen.status, EraStatus::Frozen);

        // With the old era frozen a new active one can register
        catalog.register_era(&era("mainnet-002", 100, None, "v1")).unwrap();
        assert_eq!(
            catalog.active_era(Network::Mainnet).unwrap().era_id,
            "mainnet-002"
        );
    }

    #[test]
    fn test_era_lookup_by_protocol() {
        let catalog = Catalog::temporary().unwrap();
        let mut frozen = era("mainnet-001", 1, Some(99), "v1");
        frozen.protocol_min = Some(19);
        frozen.protocol_max = Some(20);
        catalog.register_era(&frozen).unwrap();

        let mut active = era("mainnet-002", 100, None, "v1");
        active.protocol_min = Some(21);
        active.protocol_max = None;
        catalog.register_era(&active).unwrap();

        assert_eq!(
            catalog
                .lookup_era_by_protocol(Network::Mainnet, 20)
                .unwrap()
                .era_id,
            "mainnet-001"
        );
        assert_eq!(
            catalog
                .lookup_era_by_protocol(Network::Mainnet, 25)
                .unwrap()
                .era_id,
            "mainnet-002"
        );
        assert!(catalog.lookup_era_by_protocol(Network::Mainnet, 5).is_err());
    }

    #[test]
    fn test_observe_protocol_widens_window() {
        let catalog = Catalog::temporary().unwrap();
        catalog.register_era(&era("mainnet-001", 1, None, "v1")).unwrap();

        catalog.observe_protocol("mainnet-001", 20).unwrap();
        catalog.observe_protocol("mainnet-001", 22).unwrap();
        catalog.observe_protocol("mainnet-001", 21).unwrap();

        let era = catalog.get_era("mainnet-001").unwrap();
        assert_eq!(era.protocol_min, Some(20));
        assert_eq!(era.protocol_max, Some(22));
    }

    #[test]
    fn test_snapshot_ids_are_monotone() {
        let catalog = Catalog::temporary().unwrap();
        let a = catalog.reserve_snapshot_id().unwrap();
        let b = catalog.reserve_snapshot_id().unwrap();
        assert!(b > a);
        assert_eq!(catalog.max_snapshot_id().unwrap(), b);
    }

    #[test]
    fn test_lineage_upsert_is_idempotent() {
        let catalog = Catalog::temporary().unwrap();
        let new = partition(&catalog, 1, 10, "operations/ledger_range=0/part-1-a.parquet");
        let id = catalog.append_lineage(new.clone()).unwrap();
        let again = catalog.append_lineage(new).unwrap();
        assert_eq!(id, again);
        assert_eq!(
            catalog.list_partitions("operations", None, None).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_retried_commit_with_new_file_name_hits_same_range() {
        // A retry uploads under a fresh uuid file name; the upsert keys
        // on the ledger range, so it must resolve to the original row
        let catalog = Catalog::temporary().unwrap();
        let id = catalog
            .append_lineage(partition(&catalog, 1, 10, "part-1-aaaa.parquet"))
            .unwrap();

        let retried = catalog
            .append_lineage(partition(&catalog, 1, 10, "part-2-bbbb.parquet"))
            .unwrap();
        assert_eq!(id, retried);

        let live = catalog.list_partitions("operations", None, None).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].file_path, "part-1-aaaa.parquet");
    }

    #[test]
    fn test_find_partition_ignores_retired_rows() {
        let catalog = Catalog::temporary().unwrap();
        let id = catalog
            .append_lineage(partition(&catalog, 1, 10, "p1"))
            .unwrap();
        assert!(catalog
            .find_partition("operations", "mainnet-001", "v1", 1, 10)
            .unwrap()
            .is_some());

        catalog.mark_retired(id).unwrap();
        assert!(catalog
            .find_partition("operations", "mainnet-001", "v1", 1, 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let catalog = Catalog::temporary().unwrap();
        catalog
            .append_lineage(partition(&catalog, 1, 10, "p1"))
            .unwrap();
        let err = catalog
            .append_lineage(partition(&catalog, 5, 15, "p2"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PartitionOverlap { .. }));

        // Adjacent is fine
        catalog
            .append_lineage(partition(&catalog, 11, 20, "p3"))
            .unwrap();
    }

    #[test]
    fn test_new_version_may_cover_same_range() {
        let catalog = Catalog::temporary().unwrap();
        catalog
            .append_lineage(partition(&catalog, 1, 10, "p1"))
            .unwrap();

        let mut v2 = partition(&catalog, 1, 10, "p1-v2");
        v2.version_label = "v2".to_owned();
        catalog.append_lineage(v2).unwrap();

        assert_eq!(
            catalog
                .list_partitions("operations", None, Some("v1"))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            catalog
                .list_partitions("operations", None, Some("v2"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_compaction_supersedes_inputs() {
        let catalog = Catalog::temporary().unwrap();
        let a = catalog
            .append_lineage(partition(&catalog, 1, 5, "pa"))
            .unwrap();
        let b = catalog
            .append_lineage(partition(&catalog, 6, 10, "pb"))
            .unwrap();

        let merged = partition(&catalog, 1, 10, "pm");
        let id = catalog.append_compacted(&[a, b], merged).unwrap();

        let live = catalog.list_partitions("operations", None, None).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, id);
        assert_eq!(catalog.get_partition(a).unwrap().superseded_by, Some(id));
    }

    #[test]
    fn test_partition_lock_excludes() {
        let catalog = Catalog::temporary().unwrap();
        let guard = catalog.try_lock_partition("operations", 0).unwrap();
        assert!(catalog.try_lock_partition("operations", 0).is_err());
        assert!(catalog.try_lock_partition("operations", 10_000).is_ok());
        drop(guard);
        assert!(catalog.try_lock_partition("operations", 0).is_ok());
    }

    #[test]
    fn test_generation_bumps_on_append() {
        let catalog = Catalog::temporary().unwrap();
        let before = catalog.generation();
        catalog
            .append_lineage(partition(&catalog, 1, 10, "p1"))
            .unwrap();
        assert!(catalog.generation() > before);
    }
}
