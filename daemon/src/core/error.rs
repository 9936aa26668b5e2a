use lumenlake_common::{
    checkpoint::CheckpointError, ledger::LedgerSequence, network::Network, pas::PasError,
    serializer::ReaderError,
};
use thiserror::Error;

// Error taxonomy of the pipeline. Variants group into the kinds below;
// call sites branch on `kind()` to decide between retry, drop-and-count,
// component halt and fail-fast.
#[derive(Debug, Error)]
pub enum PipelineError {
    // --- transient transport ---
    #[error("Upstream unavailable after {0} consecutive connection failures")]
    UpstreamUnavailable(u32),
    #[error("Upstream connection lost: {0}")]
    ConnectionLost(String),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Hot buffer error: {0}")]
    Sled(#[from] sled::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- data decode ---
    #[error("Malformed ledger {0}: no decodable content")]
    MalformedLedger(LedgerSequence),
    #[error("Decode error: {0}")]
    Reader(#[from] ReaderError),
    #[error("Row encoding error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // --- invariant violations ---
    #[error("Sequence break: expected {expected}, received {received}")]
    SequenceBreak {
        expected: LedgerSequence,
        received: LedgerSequence,
    },
    #[error("Upstream schema mismatch: unknown wire version {0}")]
    SchemaMismatch(u8),
    #[error(
        "Partition overlap on {dataset} ({era_id}/{version_label}): [{ledger_start}, {ledger_end}]"
    )]
    PartitionOverlap {
        dataset: String,
        era_id: String,
        version_label: String,
        ledger_start: LedgerSequence,
        ledger_end: LedgerSequence,
    },
    #[error("Checksum mismatch for {0}")]
    ChecksumMismatch(String),
    #[error("Schema hash mismatch for dataset {0}")]
    SchemaHashMismatch(String),
    #[error("Era overlap: {0} already active for network")]
    EraOverlap(String),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Pas(#[from] PasError),
    #[error("Provenance not verified for partition {0}")]
    PasUnverified(String),
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    // --- lookups ---
    #[error("No active era for network {0}")]
    NoActiveEra(Network),
    #[error("Era not found: {0}")]
    EraNotFound(String),
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),
    #[error("Not found: {0}")]
    NotFound(String),

    // --- resource exhaustion / lifecycle ---
    #[error("Partition {dataset}/ledger_range={range} is locked")]
    PartitionLocked { dataset: String, range: LedgerSequence },
    #[error("Pipeline channel closed")]
    ChannelClosed,
    #[error("Shutting down")]
    Shutdown,

    // --- configuration ---
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Decode,
    Invariant,
    Exhausted,
    Config,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Decode => "decode",
            ErrorKind::Invariant => "invariant",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Config => "config",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UpstreamUnavailable(_)
            | PipelineError::ConnectionLost(_)
            | PipelineError::ObjectStore(_)
            | PipelineError::Sled(_)
            | PipelineError::Io(_) => ErrorKind::Transient,

            PipelineError::MalformedLedger(_)
            | PipelineError::Reader(_)
            | PipelineError::Bincode(_)
            | PipelineError::Json(_) => ErrorKind::Decode,

            PipelineError::SequenceBreak { .. }
            | PipelineError::SchemaMismatch(_)
            | PipelineError::PartitionOverlap { .. }
            | PipelineError::ChecksumMismatch(_)
            | PipelineError::SchemaHashMismatch(_)
            | PipelineError::EraOverlap(_)
            | PipelineError::Checkpoint(_)
            | PipelineError::Pas(_)
            | PipelineError::PasUnverified(_)
            | PipelineError::Arrow(_)
            | PipelineError::Parquet(_)
            | PipelineError::NoActiveEra(_)
            | PipelineError::EraNotFound(_)
            | PipelineError::DatasetNotFound(_)
            | PipelineError::NotFound(_) => ErrorKind::Invariant,

            PipelineError::PartitionLocked { .. }
            | PipelineError::ChannelClosed
            | PipelineError::Shutdown => ErrorKind::Exhausted,

            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            PipelineError::ConnectionLost("reset".to_owned()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            PipelineError::MalformedLedger(4).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            PipelineError::SequenceBreak {
                expected: 5,
                received: 3
            }
            .kind(),
            ErrorKind::Invariant
        );
        assert_eq!(
            PipelineError::Config("bad".to_owned()).kind(),
            ErrorKind::Config
        );
        assert_eq!(PipelineError::ChannelClosed.kind(), ErrorKind::Exhausted);
    }
}
