use crate::{
    config::Config,
    core::{
        catalog::{Catalog, LineagePartition, NewPartition},
        error::PipelineError,
        store::{checksum_bytes, manifest_path, partition_file_path, Lake, PAS_PREFIX},
    },
};
use bytes::Bytes;
use log::{debug, info, warn};
use lumenlake_common::ledger::LedgerSequence;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub compacted_groups: usize,
    pub expired: usize,
    pub vacuumed: usize,
}

// Compact small files, expire superseded snapshots, vacuum orphans.
// Always in that order; every step is idempotent and a re-run on an idle
// catalog is a no-op after the first full cycle.
pub struct Maintenance<'a> {
    catalog: &'a Catalog,
    lake: &'a Lake,
    config: &'a Config,
}

impl<'a> Maintenance<'a> {
    pub fn new(catalog: &'a Catalog, lake: &'a Lake, config: &'a Config) -> Self {
        Self {
            catalog,
            lake,
            config,
        }
    }

    pub async fn run_cycle(&self) -> Result<MaintenanceReport, PipelineError> {
        let report = MaintenanceReport {
            compacted_groups: self.compact().await?,
            expired: self.expire()?,
            vacuumed: self.vacuum().await?,
        };
        info!(
            "maintenance cycle: {} groups compacted, {} snapshots expired, {} objects vacuumed",
            report.compacted_groups, report.expired, report.vacuumed
        );
        Ok(report)
    }

    fn range_of(&self, ledger_start: LedgerSequence) -> LedgerSequence {
        (ledger_start / self.config.ledger_range_size) * self.config.ledger_range_size
    }

    // Merge adjacent files inside each (dataset, era, version, range)
    // group, preserving row order. Inputs stay referenced until expire.
    async fn compact(&self) -> Result<usize, PipelineError> {
        let mut groups: BTreeMap<(String, String, String, LedgerSequence), Vec<LineagePartition>> =
            BTreeMap::new();
        for partition in self.catalog.list_all_partitions()? {
            if !partition.is_live() {
                continue;
            }
            let range = self.range_of(partition.ledger_start);
            groups
                .entry((
                    partition.dataset.clone(),
                    partition.era_id.clone(),
                    partition.version_label.clone(),
                    range,
                ))
                .or_default()
                .push(partition);
        }

        let mut compacted = 0;
        for ((dataset, era_id, version_label, range), mut inputs) in groups {
            if inputs.len() < 2 {
                continue;
            }
            inputs.sort_by_key(|p| p.ledger_start);
            inputs.truncate(self.config.max_compact_files);

            // Never compact a range the flusher is writing right now
            let _lock = match self.catalog.try_lock_partition(&dataset, range) {
                Ok(lock) => lock,
                Err(PipelineError::PartitionLocked { .. }) => {
                    debug!("compact: {} range {} is locked, skipping", dataset, range);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self
                .compact_group(&dataset, &era_id, &version_label, range, &inputs)
                .await
            {
                Ok(id) => {
                    debug!(
                        "compacted {} files of {} range {} into snapshot {}",
                        inputs.len(),
                        dataset,
                        range,
                        id
                    );
                    compacted += 1;
                }
                Err(e) => warn!("compact of {} range {} failed: {}", dataset, range, e),
            }
        }
        Ok(compacted)
    }

    async fn compact_group(
        &self,
        dataset: &str,
        era_id: &str,
        version_label: &str,
        range: LedgerSequence,
        inputs: &[LineagePartition],
    ) -> Result<u64, PipelineError> {
        let snapshot_id = self.catalog.reserve_snapshot_id()?;
        let file_path = partition_file_path(dataset, range, snapshot_id);

        // Read every input in ledger order and stream it into one file
        let mut writer: Option<ArrowWriter<Vec<u8>>> = None;
        let mut row_count: u64 = 0;

        for input in inputs {
            let bytes = self.lake.get(&input.file_path).await?;
            if checksum_bytes(&bytes) != input.checksum {
                return Err(PipelineError::ChecksumMismatch(input.file_path.clone()));
            }

            let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
            for batch in reader {
                let batch = batch?;
                row_count += batch.num_rows() as u64;
                match writer.as_mut() {
                    Some(writer) => writer.write(&batch)?,
                    None => {
                        let mut fresh = ArrowWriter::try_new(Vec::new(), batch.schema(), None)?;
                        fresh.write(&batch)?;
                        writer = Some(fresh);
                    }
                }
            }
        }

        let buffer = match writer {
            Some(writer) => writer.into_inner()?,
            None => {
                return Err(PipelineError::NotFound(format!(
                    "no rows to compact in {} range {}",
                    dataset, range
                )))
            }
        };

        let checksum = checksum_bytes(&buffer);
        let size = buffer.len() as u64;
        self.lake.put(&file_path, Bytes::from(buffer)).await?;

        let input_ids: Vec<u64> = inputs.iter().map(|p| p.id).collect();
        let ledger_start = inputs.iter().map(|p| p.ledger_start).min().unwrap_or(0);
        let ledger_end = inputs.iter().map(|p| p.ledger_end).max().unwrap_or(0);

        self.catalog.append_compacted(
            &input_ids,
            NewPartition {
                snapshot_id,
                dataset: dataset.to_owned(),
                era_id: era_id.to_owned(),
                version_label: version_label.to_owned(),
                ledger_start,
                ledger_end,
                file_path,
                checksum,
                row_count,
                bytes: size,
                pas_verified: false,
            },
        )
    }

    // Retire superseded snapshots beyond the retention budget. The
    // numeric value means exactly "retain the latest N"; callers must not
    // read anything else into it.
    fn expire(&self) -> Result<usize, PipelineError> {
        let mut superseded: BTreeMap<(String, String, String), Vec<LineagePartition>> =
            BTreeMap::new();
        for partition in self.catalog.list_all_partitions()? {
            if partition.retired || partition.superseded_by.is_none() {
                continue;
            }
            superseded
                .entry((
                    partition.dataset.clone(),
                    partition.era_id.clone(),
                    partition.version_label.clone(),
                ))
                .or_default()
                .push(partition);
        }

        let mut expired = 0;
        for (_, mut partitions) in superseded {
            // Newest first; everything past the retention budget goes
            partitions.sort_by(|a, b| b.id.cmp(&a.id));
            for partition in partitions.into_iter().skip(self.config.retain_snapshots) {
                self.catalog.mark_retired(partition.id)?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    // Delete storage objects no live snapshot references: data files of
    // retired rows, plus uploads that never got a lineage row.
    async fn vacuum(&self) -> Result<usize, PipelineError> {
        let all = self.catalog.list_all_partitions()?;
        let mut referenced: HashSet<String> = HashSet::new();
        let mut retired_rows = Vec::new();
        for partition in &all {
            if partition.retired {
                retired_rows.push(partition.clone());
            } else {
                referenced.insert(partition.file_path.clone());
                referenced.insert(manifest_path(&partition.dataset, partition.id));
            }
        }

        let mut vacuumed = 0;

        // Retired snapshots: object, manifest, then the catalog row
        for partition in retired_rows {
            self.lake.delete(&partition.file_path).await?;
            self.lake
                .delete(&manifest_path(&partition.dataset, partition.id))
                .await?;
            self.catalog.remove_partition(partition.id)?;
            vacuumed += 1;
        }

        // Orphans: anything on storage that no lineage row points at.
        // Ranges currently under a partition lock are skipped, they may
        // hold an upload whose lineage append is still in flight.
        for (path, _) in self.lake.list_prefix("").await? {
            if path.starts_with(PAS_PREFIX) || referenced.contains(&path) {
                continue;
            }
            if let Some((dataset, range)) = parse_partition_path(&path) {
                match self.catalog.try_lock_partition(&dataset, range) {
                    Ok(_lock) => {
                        debug!("vacuum: removing orphan {}", path);
                        self.lake.delete(&path).await?;
                        vacuumed += 1;
                    }
                    Err(_) => continue,
                }
            } else if path.contains("/_manifest/") {
                debug!("vacuum: removing orphan manifest {}", path);
                self.lake.delete(&path).await?;
                vacuumed += 1;
            }
        }

        Ok(vacuumed)
    }
}

// "{dataset}/ledger_range={R}/part-..." -> (dataset, R)
fn parse_partition_path(path: &str) -> Option<(String, LedgerSequence)> {
    let mut parts = path.split('/');
    let dataset = parts.next()?;
    let range_dir = parts.next()?;
    let range = range_dir.strip_prefix("ledger_range=")?.parse().ok()?;
    parts.next()?;
    Some((dataset.to_owned(), range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::batch::BatchBuilder;
    use crate::core::flush::block_to_parquet;
    use lumenlake_common::{
        crypto::hash,
        rows::{OperationRow, Row, RowKind, RowMeta},
    };

    fn op_row(sequence: u32, op_index: u32) -> Row {
        Row::Operation(
            RowMeta {
                ledger_sequence: sequence,
                closed_at: 1_700_000_000_000_000,
                ledger_range: 0,
                era_id: "mainnet-001".to_owned(),
                version_label: "v1".to_owned(),
            },
            OperationRow {
                tx_hash: hash(&sequence.to_be_bytes()),
                op_index,
                op_type: "payment".to_owned(),
                source_account: "GSRC".to_owned(),
                destination: None,
                asset: None,
                amount: Some(sequence as i64),
                successful: true,
            },
        )
    }

    async fn seed_partition(
        catalog: &Catalog,
        lake: &Lake,
        start: u32,
        end: u32,
    ) -> u64 {
        let mut builder = BatchBuilder::new(RowKind::Operations, 10_000, usize::MAX);
        for sequence in start..=end {
            builder.add(&op_row(sequence, 0)).unwrap();
        }
        let block = builder.build().unwrap().unwrap();
        let bytes = block_to_parquet(&block).unwrap();
        let checksum = checksum_bytes(&bytes);

        let snapshot_id = catalog.reserve_snapshot_id().unwrap();
        let file_path = partition_file_path("operations", 0, snapshot_id);
        lake.put(&file_path, Bytes::from(bytes.clone())).await.unwrap();

        catalog
            .append_lineage(NewPartition {
                snapshot_id,
                dataset: "operations".to_owned(),
                era_id: "mainnet-001".to_owned(),
                version_label: "v1".to_owned(),
                ledger_start: start,
                ledger_end: end,
                file_path,
                checksum,
                row_count: (end - start + 1) as u64,
                bytes: bytes.len() as u64,
                pas_verified: false,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_compact_preserves_rows_and_order() {
        let catalog = Catalog::temporary().unwrap();
        let lake = Lake::in_memory();
        let config = Config::default();

        seed_partition(&catalog, &lake, 1, 50).await;
        seed_partition(&catalog, &lake, 51, 100).await;

        let maintenance = Maintenance::new(&catalog, &lake, &config);
        let report = maintenance.run_cycle().await.unwrap();
        assert_eq!(report.compacted_groups, 1);

        let live = catalog.list_partitions("operations", None, None).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].ledger_start, 1);
        assert_eq!(live[0].ledger_end, 100);
        assert_eq!(live[0].row_count, 100);

        // Reading the merged file yields all rows in ledger order
        let bytes = lake.get(&live[0].file_path).await.unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
            .unwrap()
            .build()
            .unwrap();
        let mut sequences = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<arrow_array::UInt32Array>()
                .unwrap();
            sequences.extend((0..column.len()).map(|i| column.value(i)));
        }
        assert_eq!(sequences, (1..=100u32).collect::<Vec<_>>());

        // Second cycle on the idle catalog is a no-op
        let second = Maintenance::new(&catalog, &lake, &config)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(second.compacted_groups, 0);
    }

    #[tokio::test]
    async fn test_expire_and_vacuum_superseded() {
        let catalog = Catalog::temporary().unwrap();
        let lake = Lake::in_memory();
        let config = Config {
            retain_snapshots: 1,
            ..Config::default()
        };

        seed_partition(&catalog, &lake, 1, 10).await;
        seed_partition(&catalog, &lake, 11, 20).await;
        seed_partition(&catalog, &lake, 21, 30).await;

        let maintenance = Maintenance::new(&catalog, &lake, &config);
        let first = maintenance.run_cycle().await.unwrap();
        assert_eq!(first.compacted_groups, 1);
        // Three superseded inputs, retention keeps the latest one
        assert_eq!(first.expired, 2);
        assert_eq!(first.vacuumed, 2);

        // The retired inputs are gone from catalog and storage
        let remaining = catalog.list_all_partitions().unwrap();
        assert_eq!(remaining.len(), 2);

        let second = Maintenance::new(&catalog, &lake, &config)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(second, MaintenanceReport::default());
    }

    #[tokio::test]
    async fn test_vacuum_removes_orphan_upload() {
        let catalog = Catalog::temporary().unwrap();
        let lake = Lake::in_memory();
        let config = Config::default();

        // Upload without a lineage row, as after a crash between (i) and (ii)
        lake.put(
            "operations/ledger_range=0/part-99-deadbeef.parquet",
            Bytes::from_static(b"orphan"),
        )
        .await
        .unwrap();

        let report = Maintenance::new(&catalog, &lake, &config)
            .run_cycle()
            .await
            .unwrap();
        assert_eq!(report.vacuumed, 1);
        assert!(!lake
            .exists("operations/ledger_range=0/part-99-deadbeef.parquet")
            .await
            .unwrap());
    }
}
