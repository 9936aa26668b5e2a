use crate::core::error::PipelineError;
use arrow_array::{
    builder::{
        BooleanBuilder, FixedSizeBinaryBuilder, Int64Builder, StringBuilder,
        TimestampMicrosecondBuilder, UInt16Builder, UInt32Builder, UInt64Builder,
    },
    ArrayRef, RecordBatch as ArrowBatch,
};
use arrow_schema::{ArrowError, Schema};
use lumenlake_common::{
    crypto::Hash,
    ledger::LedgerSequence,
    rows::{Column, ColumnType, Row, RowKind, SchemaDef, Value},
    time::{get_current_time_in_micros, TimestampMicros},
};
use std::sync::Arc;

// A closed columnar block of rows of a single dataset
#[derive(Debug, Clone)]
pub struct RecordBlock {
    pub kind: RowKind,
    pub schema_hash: Hash,
    pub row_count: usize,
    pub ledger_range_min: LedgerSequence,
    pub ledger_range_max: LedgerSequence,
    pub produced_at: TimestampMicros,
    pub columns: ArrowBatch,
}

enum ColumnBuilder {
    U16(UInt16Builder),
    U32(UInt32Builder),
    U64(UInt64Builder),
    I64(Int64Builder),
    Bool(BooleanBuilder),
    Str(StringBuilder),
    Hash32(FixedSizeBinaryBuilder),
    Timestamp(TimestampMicrosecondBuilder),
}

impl ColumnBuilder {
    fn for_type(ty: ColumnType) -> Self {
        match ty {
            ColumnType::U16 => ColumnBuilder::U16(UInt16Builder::new()),
            ColumnType::U32 => ColumnBuilder::U32(UInt32Builder::new()),
            ColumnType::U64 => ColumnBuilder::U64(UInt64Builder::new()),
            ColumnType::I64 => ColumnBuilder::I64(Int64Builder::new()),
            ColumnType::Bool => ColumnBuilder::Bool(BooleanBuilder::new()),
            ColumnType::Str => ColumnBuilder::Str(StringBuilder::new()),
            ColumnType::Hash32 => ColumnBuilder::Hash32(FixedSizeBinaryBuilder::new(32)),
            ColumnType::TimestampMicros => {
                ColumnBuilder::Timestamp(TimestampMicrosecondBuilder::new())
            }
        }
    }

    fn append(&mut self, column: &Column, value: &Value) -> Result<usize, PipelineError> {
        if !value.matches(column.ty) {
            return Err(PipelineError::Arrow(ArrowError::InvalidArgumentError(
                format!("value {:?} does not fit column {}", value, column.name),
            )));
        }
        if value.is_null() && !column.nullable {
            return Err(PipelineError::Arrow(ArrowError::InvalidArgumentError(
                format!("null in non-nullable column {}", column.name),
            )));
        }

        // Returns an estimate of the appended size in bytes
        let appended = match (self, value) {
            (ColumnBuilder::U16(b), Value::U16(v)) => {
                b.append_value(*v);
                2
            }
            (ColumnBuilder::U32(b), Value::U32(v)) => {
                b.append_value(*v);
                4
            }
            (ColumnBuilder::U64(b), Value::U64(v)) => {
                b.append_value(*v);
                8
            }
            (ColumnBuilder::I64(b), Value::I64(v)) => {
                b.append_value(*v);
                8
            }
            (ColumnBuilder::Bool(b), Value::Bool(v)) => {
                b.append_value(*v);
                1
            }
            (ColumnBuilder::Str(b), Value::Str(v)) => {
                b.append_value(v);
                v.len() + 4
            }
            (ColumnBuilder::Hash32(b), Value::Hash(v)) => {
                b.append_value(v.as_bytes())?;
                32
            }
            (ColumnBuilder::Timestamp(b), Value::Timestamp(v)) => {
                b.append_value(*v as i64);
                8
            }
            (builder, Value::Null) => {
                builder.append_null();
                1
            }
            _ => {
                return Err(PipelineError::Arrow(ArrowError::InvalidArgumentError(
                    format!("builder/value mismatch for column {}", column.name),
                )))
            }
        };
        Ok(appended)
    }

    fn append_null(&mut self) {
        match self {
            ColumnBuilder::U16(b) => b.append_null(),
            ColumnBuilder::U32(b) => b.append_null(),
            ColumnBuilder::U64(b) => b.append_null(),
            ColumnBuilder::I64(b) => b.append_null(),
            ColumnBuilder::Bool(b) => b.append_null(),
            ColumnBuilder::Str(b) => b.append_null(),
            ColumnBuilder::Hash32(b) => b.append_null(),
            ColumnBuilder::Timestamp(b) => b.append_null(),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::U16(b) => Arc::new(b.finish()),
            ColumnBuilder::U32(b) => Arc::new(b.finish()),
            ColumnBuilder::U64(b) => Arc::new(b.finish()),
            ColumnBuilder::I64(b) => Arc::new(b.finish()),
            ColumnBuilder::Bool(b) => Arc::new(b.finish()),
            ColumnBuilder::Str(b) => Arc::new(b.finish()),
            ColumnBuilder::Hash32(b) => Arc::new(b.finish()),
            ColumnBuilder::Timestamp(b) => Arc::new(b.finish()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Open,
    Full,
}

// Accumulates typed rows of one dataset into a columnar block, bounded by
// max_rows and max_bytes. Row order within the block is insertion order.
pub struct BatchBuilder {
    kind: RowKind,
    schema: &'static SchemaDef,
    arrow_schema: Arc<Schema>,
    builders: Vec<ColumnBuilder>,
    max_rows: usize,
    max_bytes: usize,
    row_count: usize,
    approx_bytes: usize,
    min_sequence: Option<LedgerSequence>,
    max_sequence: Option<LedgerSequence>,
}

impl BatchBuilder {
    pub fn new(kind: RowKind, max_rows: usize, max_bytes: usize) -> Self {
        let schema = kind.schema();
        let arrow_schema = Arc::new(schema.arrow_schema());
        Self {
            kind,
            schema,
            arrow_schema,
            builders: Self::fresh_builders(schema),
            max_rows,
            max_bytes,
            row_count: 0,
            approx_bytes: 0,
            min_sequence: None,
            max_sequence: None,
        }
    }

    fn fresh_builders(schema: &SchemaDef) -> Vec<ColumnBuilder> {
        schema
            .columns()
            .iter()
            .map(|column| ColumnBuilder::for_type(column.ty))
            .collect()
    }

    pub fn kind(&self) -> RowKind {
        self.kind
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn is_full(&self) -> bool {
        self.row_count >= self.max_rows || self.approx_bytes >= self.max_bytes
    }

    // Append one row. The row always lands in the current batch; the
    // returned status tells the caller to close it before adding more.
    pub fn add(&mut self, row: &Row) -> Result<BatchStatus, PipelineError> {
        debug_assert_eq!(row.kind(), self.kind);

        let values = row.values();
        if values.len() != self.schema.len() {
            return Err(PipelineError::SchemaHashMismatch(self.kind.dataset_name()));
        }

        for ((builder, column), value) in self
            .builders
            .iter_mut()
            .zip(self.schema.columns())
            .zip(values.iter())
        {
            self.approx_bytes += builder.append(column, value)?;
        }

        let sequence = row.ledger_sequence();
        self.min_sequence = Some(self.min_sequence.map_or(sequence, |min| min.min(sequence)));
        self.max_sequence = Some(self.max_sequence.map_or(sequence, |max| max.max(sequence)));
        self.row_count += 1;

        Ok(if self.is_full() {
            BatchStatus::Full
        } else {
            BatchStatus::Open
        })
    }

    // Close the current batch. Returns None when empty; the builder is
    // ready for new rows afterwards.
    pub fn build(&mut self) -> Result<Option<RecordBlock>, PipelineError> {
        if self.row_count == 0 {
            return Ok(None);
        }

        let arrays: Vec<ArrayRef> = self.builders.iter_mut().map(|b| b.finish()).collect();
        let columns = ArrowBatch::try_new(self.arrow_schema.clone(), arrays)?;

        let block = RecordBlock {
            kind: self.kind,
            schema_hash: self.schema.schema_hash(),
            row_count: self.row_count,
            ledger_range_min: self.min_sequence.unwrap_or(0),
            ledger_range_max: self.max_sequence.unwrap_or(0),
            produced_at: get_current_time_in_micros(),
            columns,
        };

        self.reset();
        Ok(Some(block))
    }

    pub fn reset(&mut self) {
        self.builders = Self::fresh_builders(self.schema);
        self.row_count = 0;
        self.approx_bytes = 0;
        self.min_sequence = None;
        self.max_sequence = None;
    }

    // Drop any buffered state and give the allocation back
    pub fn release(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumenlake_common::crypto::hash;
    use lumenlake_common::rows::{OperationRow, RowMeta};

    fn op_row(sequence: u32, op_index: u32) -> Row {
        Row::Operation(
            RowMeta {
                ledger_sequence: sequence,
                closed_at: 1_700_000_000_000_000,
                ledger_range: 0,
                era_id: "mainnet-1".to_owned(),
                version_label: "v1".to_owned(),
            },
            OperationRow {
                tx_hash: hash(&sequence.to_be_bytes()),
                op_index,
                op_type: "payment".to_owned(),
                source_account: "GSRC".to_owned(),
                destination: Some("GDST".to_owned()),
                asset: None,
                amount: Some(25),
                successful: true,
            },
        )
    }

    #[test]
    fn test_closes_at_exactly_max_rows() {
        let mut builder = BatchBuilder::new(RowKind::Operations, 3, usize::MAX);
        assert_eq!(builder.add(&op_row(1, 0)).unwrap(), BatchStatus::Open);
        assert_eq!(builder.add(&op_row(1, 1)).unwrap(), BatchStatus::Open);
        assert_eq!(builder.add(&op_row(2, 0)).unwrap(), BatchStatus::Full);

        let block = builder.build().unwrap().unwrap();
        assert_eq!(block.row_count, 3);
        assert_eq!(block.ledger_range_min, 1);
        assert_eq!(block.ledger_range_max, 2);

        // The builder starts a fresh batch afterwards
        assert_eq!(builder.add(&op_row(3, 0)).unwrap(), BatchStatus::Open);
        let next = builder.build().unwrap().unwrap();
        assert_eq!(next.row_count, 1);
        assert_eq!(next.ledger_range_min, 3);
    }

    #[test]
    fn test_closes_on_byte_budget_after_current_row() {
        // Tiny budget: the first row exceeds it, so row M closes the batch
        // and row M+1 opens the next one
        let mut builder = BatchBuilder::new(RowKind::Operations, usize::MAX, 8);
        assert_eq!(builder.add(&op_row(1, 0)).unwrap(), BatchStatus::Full);
        let block = builder.build().unwrap().unwrap();
        assert_eq!(block.row_count, 1);
    }

    #[test]
    fn test_empty_build_returns_none() {
        let mut builder = BatchBuilder::new(RowKind::Operations, 10, usize::MAX);
        assert!(builder.build().unwrap().is_none());
    }

    #[test]
    fn test_schema_and_nulls() {
        let mut builder = BatchBuilder::new(RowKind::Operations, 10, usize::MAX);
        builder.add(&op_row(1, 0)).unwrap();
        let block = builder.build().unwrap().unwrap();

        assert_eq!(block.schema_hash, RowKind::Operations.schema_hash());
        assert_eq!(block.columns.num_columns(), RowKind::Operations.schema().len());
        // The asset column of the row is NULL
        let asset_index = RowKind::Operations
            .schema()
            .columns()
            .iter()
            .position(|c| c.name == "asset")
            .unwrap();
        assert_eq!(block.columns.column(asset_index).null_count(), 1);
    }

    #[test]
    fn test_row_order_preserved() {
        let mut builder = BatchBuilder::new(RowKind::Operations, 100, usize::MAX);
        for i in 0..10u32 {
            builder.add(&op_row(5, i)).unwrap();
        }
        let block = builder.build().unwrap().unwrap();

        let index = RowKind::Operations
            .schema()
            .columns()
            .iter()
            .position(|c| c.name == "op_index")
            .unwrap();
        let column = block
            .columns
            .column(index)
            .as_any()
            .downcast_ref::<arrow_array::UInt32Array>()
            .unwrap();
        let values: Vec<u32> = (0..column.len()).map(|i| column.value(i)).collect();
        assert_eq!(values, (0..10).collect::<Vec<u32>>());
    }
}
