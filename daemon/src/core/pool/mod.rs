pub mod reassembler;

use crate::{
    config::EXTRACTOR_TIMEOUT_SECS,
    core::{
        error::{ErrorKind, PipelineError},
        extract::{ExtractConfig, ExtractorRegistry},
        health::{Component, ComponentState, SharedHealth},
        shutdown::ShutdownSignal,
    },
};
use log::{debug, error, trace, warn};
use lumenlake_common::{
    ledger::{LedgerSequence, ProtocolVersion, RawLedger},
    rows::{Row, RowKind},
    time::TimestampMicros,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};

// Extraction result for one ledger, every enabled dataset at once
pub struct BatchResult {
    pub sequence: LedgerSequence,
    pub close_time: TimestampMicros,
    pub protocol: ProtocolVersion,
    pub tables: HashMap<RowKind, Vec<Row>>,
    pub duration: Duration,
}

// W parallel workers pulling raw ledgers off a shared bounded queue and
// pushing extraction results into the ordered reassembler. Downstream
// consumers always observe ledgers strictly in sequence.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        workers: usize,
        registry: Arc<ExtractorRegistry>,
        extract_config: ExtractConfig,
        input: mpsc::Receiver<Result<RawLedger, PipelineError>>,
        start_sequence: LedgerSequence,
        reassembly_buffer: usize,
        health: SharedHealth,
        shutdown: ShutdownSignal,
    ) -> (Self, mpsc::Receiver<BatchResult>) {
        let shared_input = Arc::new(Mutex::new(input));
        let (result_sender, result_receiver) = mpsc::channel(reassembly_buffer.max(1));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                registry.clone(),
                extract_config.clone(),
                shared_input.clone(),
                result_sender.clone(),
                health.clone(),
                shutdown.clone(),
            )));
        }
        drop(result_sender);

        let ordered = reassembler::spawn(result_receiver, start_sequence, reassembly_buffer);
        (Self { handles }, ordered)
    }

    // Wait for every worker to finish its current ledger and exit
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    registry: Arc<ExtractorRegistry>,
    extract_config: ExtractConfig,
    input: Arc<Mutex<mpsc::Receiver<Result<RawLedger, PipelineError>>>>,
    output: mpsc::Sender<BatchResult>,
    health: SharedHealth,
    mut shutdown: ShutdownSignal,
) {
    debug!("worker {} started", worker_id);

    loop {
        // Take the queue lock only long enough to pop one ledger
        let item = {
            let mut receiver = input.lock().await;
            tokio::select! {
                item = receiver.recv() => item,
                _ = shutdown.cancelled() => {
                    debug!("worker {} draining on shutdown", worker_id);
                    // Finish whatever is already queued without blocking
                    // on a quiet upstream
                    match receiver.try_recv() {
                        Ok(item) => Some(item),
                        Err(_) => None,
                    }
                }
            }
        };

        let raw = match item {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                match e.kind() {
                    ErrorKind::Transient => {
                        warn!("worker {}: upstream degraded: {}", worker_id, e);
                        health.set(Component::Source, ComponentState::Degraded);
                        continue;
                    }
                    _ => {
                        // Sequence break or schema mismatch halts ingestion
                        error!("worker {}: upstream stream failed: {}", worker_id, e);
                        health.set(Component::Source, ComponentState::Unhealthy);
                        return;
                    }
                }
            }
            None => {
                debug!("worker {} exiting: input closed", worker_id);
                return;
            }
        };

        health.set(Component::Source, ComponentState::Healthy);

        let sequence = raw.sequence;
        let close_time = raw.close_time;
        let protocol = raw.protocol;
        let started = std::time::Instant::now();

        let extraction = {
            let registry = registry.clone();
            let config = extract_config.clone();
            timeout(
                Duration::from_secs(EXTRACTOR_TIMEOUT_SECS),
                tokio::task::spawn_blocking(move || registry.extract(&raw, &config)),
            )
            .await
        };

        let output_tables = match extraction {
            Ok(Ok(Ok(output))) => {
                trace!(
                    "worker {} extracted ledger {}: {} rows",
                    worker_id,
                    sequence,
                    output.row_count()
                );
                metrics::counter!("lumenlake_ledgers_extracted").increment(1);
                metrics::counter!("lumenlake_rows_extracted")
                    .increment(output.row_count() as u64);
                output.tables
            }
            Ok(Ok(Err(e))) => {
                // Malformed ledger: counted and skipped, the stream goes on
                warn!("worker {}: ledger {} dropped: {}", worker_id, sequence, e);
                metrics::counter!("lumenlake_ledgers_dropped").increment(1);
                HashMap::new()
            }
            Ok(Err(join_error)) => {
                error!(
                    "worker {}: extraction task failed for ledger {}: {}",
                    worker_id, sequence, join_error
                );
                HashMap::new()
            }
            Err(_) => {
                warn!(
                    "worker {}: extraction of ledger {} exceeded {}s",
                    worker_id, sequence, EXTRACTOR_TIMEOUT_SECS
                );
                metrics::counter!("lumenlake_ledgers_dropped").increment(1);
                HashMap::new()
            }
        };

        let result = BatchResult {
            sequence,
            close_time,
            protocol,
            tables: output_tables,
            duration: started.elapsed(),
        };

        // Even a dropped ledger must flow through the reassembler, the
        // sequence would stall forever otherwise
        if output.send(result).await.is_err() {
            debug!("worker {} exiting: output closed", worker_id);
            return;
        }
    }
}
