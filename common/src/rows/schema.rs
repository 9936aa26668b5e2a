use crate::{
    crypto::{sha256, Hash},
    time::TimestampMicros,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;

// Logical column types of the dataset schemas. Kept deliberately small:
// everything a row can carry maps onto one of these, and each one has a
// fixed arrow representation so schema hashes stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    U16,
    U32,
    U64,
    I64,
    Bool,
    Str,
    // 32 byte fixed-size binary, enforced at batch build time
    Hash32,
    // UTC microseconds
    TimestampMicros,
}

impl ColumnType {
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::U16 => DataType::UInt16,
            ColumnType::U32 => DataType::UInt32,
            ColumnType::U64 => DataType::UInt64,
            ColumnType::I64 => DataType::Int64,
            ColumnType::Bool => DataType::Boolean,
            ColumnType::Str => DataType::Utf8,
            ColumnType::Hash32 => DataType::FixedSizeBinary(32),
            ColumnType::TimestampMicros => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ColumnType::U16 => "u16",
            ColumnType::U32 => "u32",
            ColumnType::U64 => "u64",
            ColumnType::I64 => "i64",
            ColumnType::Bool => "bool",
            ColumnType::Str => "str",
            ColumnType::Hash32 => "hash32",
            ColumnType::TimestampMicros => "timestamp_us",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

// Carrier columns present on every dataset, always first and in this order
pub const CARRIER_COLUMNS: [Column; 5] = [
    Column::new("ledger_sequence", ColumnType::U32),
    Column::new("closed_at", ColumnType::TimestampMicros),
    Column::new("ledger_range", ColumnType::U32),
    Column::new("era_id", ColumnType::Str),
    Column::new("version_label", ColumnType::Str),
];

// A dataset schema: the carrier columns followed by the dataset's own
#[derive(Debug, Clone)]
pub struct SchemaDef {
    pub dataset: &'static str,
    columns: Vec<Column>,
}

impl SchemaDef {
    pub fn new(dataset: &'static str, specific: &[Column]) -> Self {
        let mut columns = Vec::with_capacity(CARRIER_COLUMNS.len() + specific.len());
        columns.extend_from_slice(&CARRIER_COLUMNS);
        columns.extend_from_slice(specific);
        Self { dataset, columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    // Stable hash over the ordered column list. Appending a column changes
    // the hash; so does any rename, retype or nullability flip.
    pub fn schema_hash(&self) -> Hash {
        let mut spec = String::with_capacity(self.columns.len() * 24);
        spec.push_str(self.dataset);
        for column in &self.columns {
            spec.push(';');
            spec.push_str(column.name);
            spec.push(':');
            spec.push_str(column.ty.as_str());
            spec.push(':');
            spec.push(if column.nullable { '1' } else { '0' });
        }
        sha256(spec.as_bytes())
    }

    pub fn arrow_schema(&self) -> Schema {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name, c.ty.arrow_type(), c.nullable))
            .collect();
        Schema::new(fields)
    }
}

// One cell. `Null` is only legal in a nullable column; the batch builder
// rejects it anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    Bool(bool),
    Str(String),
    Hash(Hash),
    Timestamp(TimestampMicros),
    Null,
}

impl Value {
    pub fn opt_str(value: Option<String>) -> Self {
        match value {
            Some(s) => Value::Str(s),
            None => Value::Null,
        }
    }

    pub fn opt_i64(value: Option<i64>) -> Self {
        match value {
            Some(v) => Value::I64(v),
            None => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    // Whether this value can land in a column of the given type
    pub fn matches(&self, ty: ColumnType) -> bool {
        matches!(
            (self, ty),
            (Value::U16(_), ColumnType::U16)
                | (Value::U32(_), ColumnType::U32)
                | (Value::U64(_), ColumnType::U64)
                | (Value::I64(_), ColumnType::I64)
                | (Value::Bool(_), ColumnType::Bool)
                | (Value::Str(_), ColumnType::Str)
                | (Value::Hash(_), ColumnType::Hash32)
                | (Value::Timestamp(_), ColumnType::TimestampMicros)
                | (Value::Null, _)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Hash(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
        }
    }
}
