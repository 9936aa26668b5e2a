use crate::{
    config::Config,
    core::{
        batch::{BatchBuilder, BatchStatus, RecordBlock},
        catalog::{Catalog, NewPartition},
        error::PipelineError,
        hot::HotBuffer,
        maintain::Maintenance,
        pas::PasLog,
        store::{checksum_bytes, manifest_path, partition_file_path, Lake},
    },
};
use bytes::Bytes;
use log::{debug, error, info, warn};
use lumenlake_common::{
    checkpoint::Checkpoint,
    crypto::Hash,
    ledger::LedgerSequence,
    pas::{manifest_hash, PasBatch, PasTable},
    rows::{Row, RowKind},
};
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use std::{collections::BTreeMap, path::PathBuf, time::Instant};

// Per-dataset durable flush progress, one JSON checkpoint file each
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, kind: RowKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.dataset_name()))
    }

    pub fn load(&self, kind: RowKind) -> Result<Option<Checkpoint>, PipelineError> {
        Ok(Checkpoint::load(&self.path(kind))?)
    }

    pub fn last_flushed(&self, kind: RowKind) -> Result<LedgerSequence, PipelineError> {
        Ok(self
            .load(kind)?
            .map(|cp| cp.last_ledger as LedgerSequence)
            .unwrap_or(0))
    }

    pub fn advance(&self, kind: RowKind, ledger: LedgerSequence) -> Result<(), PipelineError> {
        let mut checkpoint = self.load(kind)?.unwrap_or_else(|| Checkpoint::new(0));
        checkpoint.advance(ledger as u64)?;
        checkpoint.store(&self.path(kind))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FlushReport {
    pub watermark: Option<LedgerSequence>,
    pub partitions: Vec<u64>,
    pub rows: u64,
    pub no_op: bool,
    // Datasets (or the provenance seal) that failed this cycle. A failed
    // dataset halts at its checkpoint and is retried next cycle; it never
    // blocks the others.
    pub failures: Vec<String>,
}

// Manifest document written next to the data files of one snapshot
#[derive(Debug, Serialize)]
struct SnapshotManifest<'a> {
    snapshot_id: u64,
    dataset: &'a str,
    era_id: &'a str,
    version_label: &'a str,
    ledger_start: LedgerSequence,
    ledger_end: LedgerSequence,
    file_path: &'a str,
    checksum: &'a Hash,
    row_count: u64,
}

// The cold flusher: MARK -> FLUSH -> DELETE -> MAINTAIN. Single mutator
// of checkpoints, lineage and hot-buffer deletions.
pub struct Flusher<'a> {
    hot: &'a HotBuffer,
    catalog: &'a Catalog,
    lake: &'a Lake,
    pas: &'a PasLog,
    checkpoints: &'a CheckpointStore,
    config: &'a Config,
    kinds: Vec<RowKind>,
    flush_count: u64,
}

impl<'a> Flusher<'a> {
    pub fn new(
        hot: &'a HotBuffer,
        catalog: &'a Catalog,
        lake: &'a Lake,
        pas: &'a PasLog,
        checkpoints: &'a CheckpointStore,
        config: &'a Config,
        kinds: Vec<RowKind>,
    ) -> Self {
        Self {
            hot,
            catalog,
            lake,
            pas,
            checkpoints,
            config,
            kinds,
            flush_count: 0,
        }
    }

    // One full cycle. Safe to re-run at any point: uploads without
    // lineage are orphans for vacuum, lineage appends are upserts and the
    // checkpoint only moves forward.
    pub async fn flush_cycle(&mut self) -> Result<FlushReport, PipelineError> {
        let started = Instant::now();

        // MARK
        let watermark = match self.hot.high_watermark(&self.kinds)? {
            Some(w) => w,
            None => {
                debug!("flush: hot buffer empty, no-op");
                return Ok(FlushReport {
                    no_op: true,
                    ..FlushReport::default()
                });
            }
        };

        let mut report = FlushReport {
            watermark: Some(watermark),
            ..FlushReport::default()
        };
        let mut tables: Vec<PasTable> = Vec::new();
        let mut files: Vec<(String, Hash)> = Vec::new();
        let mut flushed_start = LedgerSequence::MAX;

        // FLUSH, dataset by dataset. A failing dataset is isolated: it
        // stays at its checkpoint for the next cycle while every other
        // dataset, the provenance seal, DELETE and MAINTAIN still run.
        for kind in self.kinds.clone() {
            match self.flush_kind(kind, watermark).await {
                Ok(committed) => {
                    for (partition_id, file_path, checksum, row_count, start) in committed {
                        flushed_start = flushed_start.min(start);
                        report.partitions.push(partition_id);
                        report.rows += row_count;
                        tables.push(PasTable {
                            name: kind.dataset_name(),
                            rows: row_count,
                            checksum: checksum.clone(),
                        });
                        files.push((file_path, checksum));
                    }
                }
                Err(e) => {
                    error!("flush of {} failed: {}", kind, e);
                    metrics::counter!("lumenlake_flush_failures").increment(1);
                    report.failures.push(format!("{}: {}", kind, e));
                }
            }
        }

        if report.partitions.is_empty() {
            debug!("flush: nothing new below watermark {}", watermark);
            report.no_op = report.failures.is_empty();
        } else {
            // Seal the provenance event over everything this cycle wrote
            let batch = PasBatch {
                ledger_start: flushed_start,
                ledger_end: watermark,
                tables,
                manifest_hash: manifest_hash(&files),
                duration_ms: started.elapsed().as_millis() as u64,
            };
            if let Err(e) = self.seal_provenance(batch, &report.partitions).await {
                // Partitions stay pas_verified = false; strict resolution
                // keeps refusing them until a later cycle seals the chain
                error!("provenance seal failed: {}", e);
                report.failures.push(format!("provenance: {}", e));
            }
        }

        // DELETE, never past what is durably committed per dataset
        for kind in &self.kinds {
            let durable = self.checkpoints.last_flushed(*kind)?;
            let upto = watermark.min(durable);
            if upto > 0 {
                self.hot.delete_upto(*kind, upto)?;
            }
        }
        self.hot.flush()?;
        self.catalog.flush()?;

        // MAINTAIN every Nth flush
        self.flush_count += 1;
        if self.flush_count % self.config.vacuum_every_n_flushes == 0 {
            let maintenance = Maintenance::new(self.catalog, self.lake, self.config);
            if let Err(e) = maintenance.run_cycle().await {
                warn!("maintenance after flush failed: {}", e);
            }
        }

        metrics::counter!("lumenlake_partitions_committed")
            .increment(report.partitions.len() as u64);
        metrics::histogram!("lumenlake_flush_duration_ms")
            .record(started.elapsed().as_millis() as f64);
        info!(
            "flush cycle done: watermark {}, {} partitions, {} rows in {:?}",
            watermark,
            report.partitions.len(),
            report.rows,
            started.elapsed()
        );
        Ok(report)
    }

    // FLUSH of one dataset: everything in (checkpoint, watermark], then
    // the checkpoint advance. Returns the committed files.
    async fn flush_kind(
        &self,
        kind: RowKind,
        watermark: LedgerSequence,
    ) -> Result<Vec<(u64, String, Hash, u64, LedgerSequence)>, PipelineError> {
        let last_flushed = self.checkpoints.last_flushed(kind)?;
        if watermark <= last_flushed {
            // Crash recovery path: committed but not yet deleted
            debug!(
                "flush: {} already committed up to {}, skipping",
                kind, last_flushed
            );
            return Ok(Vec::new());
        }

        let rows: Vec<Row> = self
            .hot
            .scan_upto(kind, watermark)?
            .into_iter()
            .filter(|row| row.ledger_sequence() > last_flushed)
            .collect();
        if rows.is_empty() {
            // The dataset saw these ledgers and produced nothing;
            // record the progress so resume points can move
            self.checkpoints.advance(kind, watermark)?;
            return Ok(Vec::new());
        }

        let committed = self.flush_dataset(kind, &rows, watermark).await?;
        self.checkpoints.advance(kind, watermark)?;
        Ok(committed)
    }

    async fn seal_provenance(
        &self,
        batch: PasBatch,
        partitions: &[u64],
    ) -> Result<(), PipelineError> {
        let era_id = self.catalog.active_era(self.config.network)?.era_id;
        self.pas.append(self.catalog, &era_id, batch).await?;

        // The sealed event now covers these partitions
        for id in partitions {
            self.catalog.mark_pas_verified(*id)?;
        }
        Ok(())
    }

    // Write one dataset's rows as parquet files per ledger_range. Returns
    // (snapshot_id, file_path, checksum, row_count, ledger_start) per
    // committed file.
    async fn flush_dataset(
        &self,
        kind: RowKind,
        rows: &[Row],
        watermark: LedgerSequence,
    ) -> Result<Vec<(u64, String, Hash, u64, LedgerSequence)>, PipelineError> {
        // Group by (era, version, ledger_range); a cycle crossing an era
        // boundary must not mix eras inside one partition file
        let mut groups: BTreeMap<(String, String, LedgerSequence), Vec<&Row>> = BTreeMap::new();
        for row in rows {
            let meta = row.meta();
            groups
                .entry((
                    meta.era_id.clone(),
                    meta.version_label.clone(),
                    meta.ledger_range,
                ))
                .or_default()
                .push(row);
        }

        let mut committed = Vec::new();
        for ((era_id, version_label, ledger_range), group) in groups {
            let _lock = self
                .catalog
                .try_lock_partition(&kind.dataset_name(), ledger_range)?;

            for block in build_blocks(
                kind,
                &group,
                self.config.batch_max_rows,
                self.config.batch_max_bytes,
            )? {
                let entry = self
                    .commit_block(kind, &era_id, &version_label, ledger_range, &block)
                    .await?;
                committed.push(entry);
            }
        }

        debug!(
            "flushed {}: {} files up to watermark {}",
            kind,
            committed.len(),
            watermark
        );
        Ok(committed)
    }

    // Atomic per-partition commit: (i) upload, (ii) lineage upsert,
    // manifest alongside. A crash after (i) leaves an orphan for vacuum;
    // a crash between (ii) and the checkpoint advance is idempotent: the
    // re-run resolves the range to the existing lineage row before it
    // reserves a snapshot id or generates a file name.
    async fn commit_block(
        &self,
        kind: RowKind,
        era_id: &str,
        version_label: &str,
        ledger_range: LedgerSequence,
        block: &RecordBlock,
    ) -> Result<(u64, String, Hash, u64, LedgerSequence), PipelineError> {
        let dataset = kind.dataset_name();

        if let Some(existing) = self.catalog.find_partition(
            &dataset,
            era_id,
            version_label,
            block.ledger_range_min,
            block.ledger_range_max,
        )? {
            debug!(
                "flush: {} [{}, {}] already committed as snapshot {}",
                dataset, existing.ledger_start, existing.ledger_end, existing.id
            );
            return Ok((
                existing.id,
                existing.file_path,
                existing.checksum,
                existing.row_count,
                existing.ledger_start,
            ));
        }

        let snapshot_id = self.catalog.reserve_snapshot_id()?;
        let file_path = partition_file_path(&dataset, ledger_range, snapshot_id);

        let bytes = block_to_parquet(block)?;
        let checksum = checksum_bytes(&bytes);
        let size = bytes.len() as u64;
        self.lake.put(&file_path, Bytes::from(bytes)).await?;

        let partition = NewPartition {
            snapshot_id,
            dataset: dataset.clone(),
            era_id: era_id.to_owned(),
            version_label: version_label.to_owned(),
            ledger_start: block.ledger_range_min,
            ledger_end: block.ledger_range_max,
            file_path: file_path.clone(),
            checksum: checksum.clone(),
            row_count: block.row_count as u64,
            bytes: size,
            pas_verified: false,
        };
        let id = self.catalog.append_lineage(partition)?;

        let manifest = SnapshotManifest {
            snapshot_id: id,
            dataset: &dataset,
            era_id,
            version_label,
            ledger_start: block.ledger_range_min,
            ledger_end: block.ledger_range_max,
            file_path: &file_path,
            checksum: &checksum,
            row_count: block.row_count as u64,
        };
        self.lake
            .put(
                &manifest_path(&dataset, id),
                Bytes::from(serde_json::to_vec_pretty(&manifest)?),
            )
            .await?;

        Ok((
            id,
            file_path,
            checksum,
            block.row_count as u64,
            block.ledger_range_min,
        ))
    }
}

// Cut rows into record blocks, splitting only at ledger boundaries so
// partition files never overlap on ledger ranges.
fn build_blocks(
    kind: RowKind,
    rows: &[&Row],
    max_rows: usize,
    max_bytes: usize,
) -> Result<Vec<RecordBlock>, PipelineError> {
    let mut blocks = Vec::new();
    let mut builder = BatchBuilder::new(kind, max_rows, max_bytes);

    let mut iter = rows.iter().peekable();
    while let Some(row) = iter.next() {
        let status = builder.add(row)?;
        let next_sequence = iter.peek().map(|next| next.ledger_sequence());
        let boundary = next_sequence
            .map(|next| next != row.ledger_sequence())
            .unwrap_or(true);

        if status == BatchStatus::Full && boundary {
            if let Some(block) = builder.build()? {
                blocks.push(block);
            }
        }
    }

    if let Some(block) = builder.build()? {
        blocks.push(block);
    }
    Ok(blocks)
}

pub fn block_to_parquet(block: &RecordBlock) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, block.columns.schema(), None)?;
    writer.write(&block.columns)?;
    writer.close()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::{crypto::hash, rows::{OperationRow, RowMeta}};

    fn op_row(sequence: u32) -> Row {
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
                op_index: 0,
                op_type: "payment".to_owned(),
                source_account: "GSRC".to_owned(),
                destination: None,
                asset: None,
                amount: Some(5),
                successful: true,
            },
        )
    }

    #[test]
    fn test_checkpoint_store_is_monotone() {
        let dir = tempdir::TempDir::new("checkpoints").unwrap();
        let store = CheckpointStore::new(dir.path());

        assert_eq!(store.last_flushed(RowKind::Operations).unwrap(), 0);
        store.advance(RowKind::Operations, 7).unwrap();
        assert_eq!(store.last_flushed(RowKind::Operations).unwrap(), 7);

        // Datasets are tracked independently
        assert_eq!(store.last_flushed(RowKind::Effects).unwrap(), 0);

        assert!(store.advance(RowKind::Operations, 3).is_err());
    }

    #[test]
    fn test_blocks_split_only_at_ledger_boundaries() {
        // Three rows in ledger 1, two in ledger 2; max_rows 2 forces the
        // first block to run past the budget until ledger 1 ends
        let rows: Vec<Row> = vec![op_row(1), op_row(1), op_row(1), op_row(2), op_row(2)];
        let refs: Vec<&Row> = rows.iter().collect();

        let blocks = build_blocks(RowKind::Operations, &refs, 2, usize::MAX).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].row_count, 3);
        assert_eq!(blocks[0].ledger_range_min, 1);
        assert_eq!(blocks[0].ledger_range_max, 1);
        assert_eq!(blocks[1].row_count, 2);
        assert_eq!(blocks[1].ledger_range_min, 2);
    }

    #[test]
    fn test_parquet_roundtrip_row_count() {
        let rows: Vec<Row> = (1..=10u32).map(op_row).collect();
        let refs: Vec<&Row> = rows.iter().collect();
        let blocks = build_blocks(RowKind::Operations, &refs, 1000, usize::MAX).unwrap();
        assert_eq!(blocks.len(), 1);

        let bytes = block_to_parquet(&blocks[0]).unwrap();
        let reader = parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder::try_new(
            Bytes::from(bytes),
        )
        .unwrap()
        .build()
        .unwrap();

        let total: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
        assert_eq!(total, 10);
    }
}
