use crate::{config::HOT_BUFFER_TX_LIMIT, core::error::PipelineError};
use log::{debug, trace};
use lumenlake_common::{ledger::LedgerSequence, rows::{Row, RowKind}};
use std::{collections::HashMap, path::Path};

// Row-oriented transactional store holding the most recent unflushed rows.
// One sled tree per dataset; keys are ledger_sequence BE followed by the
// row's ordinal inside that ledger, so scans come back in ledger order and
// re-inserting a ledger overwrites instead of duplicating.
pub struct HotBuffer {
    db: sled::Db,
    trees: HashMap<RowKind, sled::Tree>,
}

fn row_key(sequence: LedgerSequence, ordinal: u32) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&sequence.to_be_bytes());
    key[4..].copy_from_slice(&ordinal.to_be_bytes());
    key
}

fn key_sequence(key: &[u8]) -> Option<LedgerSequence> {
    key.get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(LedgerSequence::from_be_bytes)
}

impl HotBuffer {
    pub fn open(path: &Path, kinds: &[RowKind]) -> Result<Self, PipelineError> {
        let db = sled::open(path)?;
        let mut trees = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            let tree = db.open_tree(format!("rows_{}", kind.dataset_name()))?;
            trees.insert(*kind, tree);
        }
        Ok(Self { db, trees })
    }

    // In-memory instance for tests
    pub fn temporary(kinds: &[RowKind]) -> Result<Self, PipelineError> {
        let db = sled::Config::new().temporary(true).open()?;
        let mut trees = HashMap::with_capacity(kinds.len());
        for kind in kinds {
            let tree = db.open_tree(format!("rows_{}", kind.dataset_name()))?;
            trees.insert(*kind, tree);
        }
        Ok(Self { db, trees })
    }

    fn tree(&self, kind: RowKind) -> Result<&sled::Tree, PipelineError> {
        self.trees
            .get(&kind)
            .ok_or_else(|| PipelineError::DatasetNotFound(kind.dataset_name()))
    }

    // Bulk insert of one ledger's rows for one dataset. Applied in bounded
    // batches; the ordinal is the position in `rows`, which is
    // deterministic, so at-least-once redelivery lands on the same keys.
    pub fn insert(
        &self,
        kind: RowKind,
        sequence: LedgerSequence,
        rows: &[Row],
    ) -> Result<usize, PipelineError> {
        let tree = self.tree(kind)?;
        let mut written = 0;

        for chunk in rows.chunks(HOT_BUFFER_TX_LIMIT) {
            let mut batch = sled::Batch::default();
            for (offset, row) in chunk.iter().enumerate() {
                let ordinal = (written + offset) as u32;
                let value = bincode::serialize(row)?;
                batch.insert(row_key(sequence, ordinal).to_vec(), value);
            }
            tree.apply_batch(batch)?;
            written += chunk.len();
        }

        trace!(
            "hot buffer insert: {} rows for {} at ledger {}",
            written,
            kind,
            sequence
        );
        Ok(written)
    }

    // Highest ledger sequence present for the dataset
    pub fn max_sequence(&self, kind: RowKind) -> Result<Option<LedgerSequence>, PipelineError> {
        let tree = self.tree(kind)?;
        Ok(tree
            .last()?
            .and_then(|(key, _)| key_sequence(&key)))
    }

    // High watermark: the lowest of the per-dataset maxima, over datasets
    // that hold any rows. None when the buffer is completely empty.
    pub fn high_watermark(&self, kinds: &[RowKind]) -> Result<Option<LedgerSequence>, PipelineError> {
        let mut watermark: Option<LedgerSequence> = None;
        for kind in kinds {
            if let Some(max) = self.max_sequence(*kind)? {
                watermark = Some(match watermark {
                    Some(current) => current.min(max),
                    None => max,
                });
            }
        }
        Ok(watermark)
    }

    // All rows with ledger_sequence <= upto, in ledger order
    pub fn scan_upto(
        &self,
        kind: RowKind,
        upto: LedgerSequence,
    ) -> Result<Vec<Row>, PipelineError> {
        let tree = self.tree(kind)?;
        let end = row_key(upto, u32::MAX);

        let mut rows = Vec::new();
        for item in tree.range(..=end) {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }
        Ok(rows)
    }

    // Remove flushed rows. The flusher is the only caller.
    pub fn delete_upto(
        &self,
        kind: RowKind,
        upto: LedgerSequence,
    ) -> Result<usize, PipelineError> {
        let tree = self.tree(kind)?;
        let end = row_key(upto, u32::MAX);

        let keys: Vec<sled::IVec> = tree
            .range(..=end)
            .map(|item| item.map(|(key, _)| key))
            .collect::<Result<_, _>>()?;

        for chunk in keys.chunks(HOT_BUFFER_TX_LIMIT) {
            let mut batch = sled::Batch::default();
            for key in chunk {
                batch.remove(key.clone());
            }
            tree.apply_batch(batch)?;
        }

        debug!("hot buffer delete: {} rows of {} up to {}", keys.len(), kind, upto);
        Ok(keys.len())
    }

    pub fn count(&self, kind: RowKind) -> Result<usize, PipelineError> {
        Ok(self.tree(kind)?.len())
    }

    pub fn flush(&self) -> Result<(), PipelineError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::rows::{OperationRow, RowMeta};
    use lumenlake_common::crypto::hash;

    fn op_row(sequence: u32, op_index: u32) -> Row {
        Row::Operation(
            RowMeta {
                ledger_sequence: sequence,
                closed_at: 1_700_000_000_000_000,
                ledger_range: (sequence / 10_000) * 10_000,
                era_id: "mainnet-1".to_owned(),
                version_label: "v1".to_owned(),
            },
            OperationRow {
                tx_hash: hash(&sequence.to_be_bytes()),
                op_index,
                op_type: "payment".to_owned(),
                source_account: "GSRC".to_owned(),
                destination: None,
                asset: None,
                amount: Some(10),
                successful: true,
            },
        )
    }

    fn buffer() -> HotBuffer {
        HotBuffer::temporary(&[RowKind::Operations, RowKind::Effects]).unwrap()
    }

    #[test]
    fn test_insert_scan_ordered() {
        let hot = buffer();
        hot.insert(RowKind::Operations, 2, &[op_row(2, 0), op_row(2, 1)])
            .unwrap();
        hot.insert(RowKind::Operations, 1, &[op_row(1, 0)]).unwrap();

        let rows = hot.scan_upto(RowKind::Operations, 10).unwrap();
        let sequences: Vec<u32> = rows.iter().map(|r| r.ledger_sequence()).collect();
        assert_eq!(sequences, vec![1, 2, 2]);
    }

    #[test]
    fn test_reinsert_is_idempotent() {
        let hot = buffer();
        let rows = vec![op_row(5, 0), op_row(5, 1)];
        hot.insert(RowKind::Operations, 5, &rows).unwrap();
        hot.insert(RowKind::Operations, 5, &rows).unwrap();
        assert_eq!(hot.count(RowKind::Operations).unwrap(), 2);
    }

    #[test]
    fn test_watermark_is_min_of_maxima() {
        let hot = buffer();
        hot.insert(RowKind::Operations, 10, &[op_row(10, 0)]).unwrap();
        assert_eq!(
            hot.high_watermark(&[RowKind::Operations, RowKind::Effects])
                .unwrap(),
            Some(10)
        );

        // Effects holds rows only up to ledger 8; the watermark follows
        // the slowest dataset
        hot.insert(RowKind::Effects, 8, &[op_row(8, 0)]).unwrap();
        assert_eq!(
            hot.high_watermark(&[RowKind::Operations, RowKind::Effects])
                .unwrap(),
            Some(8)
        );
    }

    #[test]
    fn test_delete_upto() {
        let hot = buffer();
        for seq in 1..=10u32 {
            hot.insert(RowKind::Operations, seq, &[op_row(seq, 0)]).unwrap();
        }

        let removed = hot.delete_upto(RowKind::Operations, 7).unwrap();
        assert_eq!(removed, 7);

        let remaining = hot.scan_upto(RowKind::Operations, u32::MAX).unwrap();
        let sequences: Vec<u32> = remaining.iter().map(|r| r.ledger_sequence()).collect();
        assert_eq!(sequences, vec![8, 9, 10]);
    }

    #[test]
    fn test_empty_watermark() {
        let hot = buffer();
        assert_eq!(
            hot.high_watermark(&[RowKind::Operations]).unwrap(),
            None
        );
    }
}
