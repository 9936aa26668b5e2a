use crate::core::error::PipelineError;
use clap::Parser;
use lumenlake_common::{
    config::{BYTES_PER_MB, DEFAULT_LEDGER_RANGE_SIZE},
    network::Network,
    prompt::LogLevel,
    rows::RowKind,
};
use std::{path::PathBuf, str::FromStr, time::Duration};

// Worker pool
// Default number of extraction workers; the input queue is workers x 2
// and the reassembly buffer workers x 4
pub const DEFAULT_WORKERS: usize = 4;
pub const QUEUE_SIZE_FACTOR: usize = 2;
pub const REASSEMBLY_BUFFER_FACTOR: usize = 4;
// Per-ledger extraction budget; a worker that exceeds it drops the ledger
// with a decode error instead of wedging shutdown
pub const EXTRACTOR_TIMEOUT_SECS: u64 = 30;

// Batch builder
pub const DEFAULT_BATCH_MAX_ROWS: usize = 1000;
pub const DEFAULT_BATCH_MAX_BYTES: usize = 64 * BYTES_PER_MB;

// Cold flusher
// Interval between flush cycles, clamped to [1h, 24h]
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 3 * 3600;
pub const MIN_FLUSH_INTERVAL_SECS: u64 = 3600;
pub const MAX_FLUSH_INTERVAL_SECS: u64 = 24 * 3600;
// Every Nth flush triggers the maintenance cycle
pub const DEFAULT_VACUUM_EVERY_N_FLUSHES: u64 = 10;
// Rows per hot-buffer transaction during bulk insert and delete
pub const HOT_BUFFER_TX_LIMIT: usize = 1000;

// Maintenance
pub const DEFAULT_MAX_COMPACT_FILES: usize = 1000;
pub const DEFAULT_RETAIN_SNAPSHOTS: usize = 20;

// Resolver
pub const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
// Era/coverage cache capacity (LRU entries)
pub const RESOLVER_CACHE_SIZE: usize = 256;

// Upstream reconnection: base 1s, factor 2, max 60s, +/-20% jitter
pub const RECONNECT_BACKOFF_BASE_MS: u64 = 1_000;
pub const RECONNECT_BACKOFF_FACTOR: u32 = 2;
pub const RECONNECT_BACKOFF_MAX_MS: u64 = 60_000;
pub const RECONNECT_BACKOFF_JITTER: f64 = 0.2;
// Consecutive reconnect failures before the client surfaces
// UpstreamUnavailable (it keeps retrying in the background)
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 5;
pub const CIRCUIT_BREAKER_RESET_SECS: u64 = 30;
// The source client must release its resources within this window on cancel
pub const SOURCE_CANCEL_TIMEOUT_SECS: u64 = 5;
// Dial timeout for one upstream connection attempt
pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 5;

// Lifecycle
// Grace window for a full drain on termination
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

// Bind addresses. RPC stays on loopback by default; the streaming query
// endpoint has no authentication layer of its own.
pub const DEFAULT_RPC_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_UPSTREAM_ADDRESS: &str = "127.0.0.1:2125";
pub const DEFAULT_SOURCE_BIND_ADDRESS: &str = "127.0.0.1:2125";

// Channel capacity between the reassembler and the hot buffer writers
pub const WRITER_CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "lumenlake_daemon",
    about = "Streaming ledger to lake pipeline",
    version,
    styles = lumenlake_common::get_cli_styles()
)]
pub struct Config {
    // Network to ingest; selects the extraction passphrase and the era map
    #[clap(long, value_enum, default_value_t = Network::Mainnet)]
    pub network: Network,

    // Upstream ledger stream address
    #[clap(long, default_value = DEFAULT_UPSTREAM_ADDRESS)]
    pub upstream_address: String,

    // First ledger to request when no checkpoint exists yet
    #[clap(long, default_value_t = 1)]
    pub start_ledger: u32,

    // Data directory for the hot buffer, catalog and checkpoints
    #[clap(long, default_value = "lumenlake")]
    pub dir_path: PathBuf,

    // Lake root. Local filesystem path backing the object store
    #[clap(long, default_value = "lumenlake/lake")]
    pub lake_path: PathBuf,

    #[clap(long, default_value = DEFAULT_RPC_BIND_ADDRESS)]
    pub rpc_bind_address: String,

    #[clap(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    // Input queue capacity, defaults to workers x 2
    #[clap(long)]
    pub queue_size: Option<usize>,

    #[clap(long, default_value_t = DEFAULT_BATCH_MAX_ROWS)]
    pub batch_max_rows: usize,

    #[clap(long, default_value_t = DEFAULT_BATCH_MAX_BYTES)]
    pub batch_max_bytes: usize,

    // Partition boundary; rows land in [R, R + ledger_range_size)
    #[clap(long, default_value_t = DEFAULT_LEDGER_RANGE_SIZE)]
    pub ledger_range_size: u32,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "3h")]
    pub flush_interval: Duration,

    #[clap(long, default_value_t = DEFAULT_VACUUM_EVERY_N_FLUSHES)]
    pub vacuum_every_n_flushes: u64,

    #[clap(long, default_value_t = DEFAULT_MAX_COMPACT_FILES)]
    pub max_compact_files: usize,

    #[clap(long, default_value_t = DEFAULT_RETAIN_SNAPSHOTS)]
    pub retain_snapshots: usize,

    #[clap(long, value_parser = humantime::parse_duration, default_value = "5m")]
    pub cache_ttl: Duration,

    // Require a verified provenance chain on every partition in scope
    #[clap(long, default_value_t = false)]
    pub strict_pas: bool,

    // Datasets to extract; empty means all
    #[clap(long, value_delimiter = ',')]
    pub datasets: Vec<String>,

    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[clap(long)]
    pub log_file: Option<String>,
}

impl Config {
    pub fn queue_size(&self) -> usize {
        self.queue_size
            .unwrap_or(self.workers * QUEUE_SIZE_FACTOR)
            .max(1)
    }

    pub fn reassembly_buffer(&self) -> usize {
        (self.workers * REASSEMBLY_BUFFER_FACTOR).max(1)
    }

    // Flush interval clamped into the supported window
    pub fn effective_flush_interval(&self) -> Duration {
        let secs = self
            .flush_interval
            .as_secs()
            .clamp(MIN_FLUSH_INTERVAL_SECS, MAX_FLUSH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    pub fn enabled_datasets(&self) -> Result<Vec<RowKind>, PipelineError> {
        if self.datasets.is_empty() {
            return Ok(RowKind::all());
        }

        let mut kinds = Vec::with_capacity(self.datasets.len());
        for name in &self.datasets {
            let kind = RowKind::from_str(name)
                .map_err(|_| PipelineError::Config(format!("unknown dataset: {}", name)))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    // Fail fast on anything the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be > 0".to_owned()));
        }
        if self.batch_max_rows == 0 {
            return Err(PipelineError::Config(
                "batch_max_rows must be > 0".to_owned(),
            ));
        }
        if self.batch_max_bytes == 0 {
            return Err(PipelineError::Config(
                "batch_max_bytes must be > 0".to_owned(),
            ));
        }
        if self.ledger_range_size == 0 {
            return Err(PipelineError::Config(
                "ledger_range_size must be > 0".to_owned(),
            ));
        }
        if self.retain_snapshots == 0 {
            return Err(PipelineError::Config(
                "retain_snapshots must be > 0".to_owned(),
            ));
        }
        if self.vacuum_every_n_flushes == 0 {
            return Err(PipelineError::Config(
                "vacuum_every_n_flushes must be > 0".to_owned(),
            ));
        }
        if self.start_ledger == 0 {
            return Err(PipelineError::Config("start_ledger must be > 0".to_owned()));
        }
        self.enabled_datasets().map(|_| ())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            upstream_address: DEFAULT_UPSTREAM_ADDRESS.to_owned(),
            start_ledger: 1,
            dir_path: PathBuf::from("lumenlake"),
            lake_path: PathBuf::from("lumenlake/lake"),
            rpc_bind_address: DEFAULT_RPC_BIND_ADDRESS.to_owned(),
            workers: DEFAULT_WORKERS,
            queue_size: None,
            batch_max_rows: DEFAULT_BATCH_MAX_ROWS,
            batch_max_bytes: DEFAULT_BATCH_MAX_BYTES,
            ledger_range_size: DEFAULT_LEDGER_RANGE_SIZE,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            vacuum_every_n_flushes: DEFAULT_VACUUM_EVERY_N_FLUSHES,
            max_compact_files: DEFAULT_MAX_COMPACT_FILES,
            retain_snapshots: DEFAULT_RETAIN_SNAPSHOTS,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            strict_pas: false,
            datasets: Vec::new(),
            log_level: LogLevel::Info,
            log_file: None,
        }
    }
}
