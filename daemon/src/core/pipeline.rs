use crate::{
    config::{Config, WRITER_CHANNEL_SIZE},
    core::{
        catalog::Catalog,
        error::PipelineError,
        extract::{ExtractConfig, ExtractorRegistry},
        flush::{CheckpointStore, FlushReport, Flusher},
        health::{Component, ComponentState, HealthRegistry, SharedHealth},
        hot::HotBuffer,
        pas::PasLog,
        pool::{BatchResult, WorkerPool},
        resolver::Resolver,
        shutdown::ShutdownSignal,
        source::SourceClient,
        store::Lake,
    },
};
use log::{debug, error, info, warn};
use lumenlake_common::{
    dataset::{Compatibility, Dataset},
    era::{Era, EraStatus},
    ledger::LedgerSequence,
    rows::{Row, RowKind},
    time::get_current_time_in_micros,
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;

// Everything the daemon holds open: stores, catalog, resolver, health.
// The ingest loop, the flusher loop and the RPC server all borrow from
// this one assembly.
pub struct Pipeline {
    pub config: Config,
    pub catalog: Arc<Catalog>,
    pub hot: Arc<HotBuffer>,
    pub lake: Lake,
    pub pas: Arc<PasLog>,
    pub resolver: Arc<Resolver>,
    pub checkpoints: Arc<CheckpointStore>,
    pub health: SharedHealth,
    pub kinds: Vec<RowKind>,
}

impl Pipeline {
    pub fn open(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let kinds = config.enabled_datasets()?;

        let catalog = Arc::new(Catalog::open(&config.dir_path.join("catalog"))?);
        let hot = Arc::new(HotBuffer::open(&config.dir_path.join("hot"), &kinds)?);
        let lake = Lake::local(&config.lake_path)?;
        let checkpoints = Arc::new(CheckpointStore::new(config.dir_path.join("checkpoints")));

        Ok(Self::assemble(config, catalog, hot, lake, checkpoints, kinds))
    }

    // In-memory stores; integration tests and the simulated deployments
    pub fn temporary(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let kinds = config.enabled_datasets()?;

        let catalog = Arc::new(Catalog::temporary()?);
        let hot = Arc::new(HotBuffer::temporary(&kinds)?);
        let lake = Lake::in_memory();
        let dir = std::env::temp_dir().join(format!("lumenlake-cp-{}", uuid::Uuid::new_v4()));
        let checkpoints = Arc::new(CheckpointStore::new(dir));

        Ok(Self::assemble(config, catalog, hot, lake, checkpoints, kinds))
    }

    fn assemble(
        config: Config,
        catalog: Arc<Catalog>,
        hot: Arc<HotBuffer>,
        lake: Lake,
        checkpoints: Arc<CheckpointStore>,
        kinds: Vec<RowKind>,
    ) -> Self {
        let pas = Arc::new(PasLog::new(lake.clone(), "lumenlake-flusher"));
        let resolver = Arc::new(Resolver::new(config.cache_ttl));
        Self {
            config,
            catalog,
            hot,
            lake,
            pas,
            resolver,
            checkpoints,
            health: HealthRegistry::new(),
            kinds,
        }
    }

    // Make sure an active era exists for the configured network and the
    // dataset registry matches the enabled kinds.
    pub fn ensure_era(&self) -> Result<Era, PipelineError> {
        let era = match self.catalog.active_era(self.config.network) {
            Ok(era) => era,
            Err(PipelineError::NoActiveEra(_)) => {
                let epoch = (self.catalog.list_eras(self.config.network)?.len() + 1) as u32;
                let era = Era {
                    era_id: format!("{}-{:03}", self.config.network, epoch),
                    network: self.config.network,
                    version_label: "v1".to_owned(),
                    ledger_start: self.config.start_ledger,
                    ledger_end: None,
                    protocol_min: None,
                    protocol_max: None,
                    status: EraStatus::Active,
                    schema_epoch: epoch,
                    pas_chain_head: None,
                    created_at: get_current_time_in_micros(),
                    frozen_at: None,
                };
                self.catalog.register_era(&era)?;
                era
            }
            Err(e) => return Err(e),
        };

        for kind in &self.kinds {
            self.catalog.upsert_dataset(&Dataset {
                name: kind.dataset_name(),
                tier: kind.tier(),
                grain: kind.grain(),
                schema_hash: kind.schema_hash(),
                compatibility: Compatibility::Additive,
                era_id: era.era_id.clone(),
                version_label: era.version_label.clone(),
            })?;
        }
        Ok(era)
    }

    // Begin a re-ingestion run under a new version label. Prior versions
    // stay resolvable; `latest` now points at the new label.
    pub fn start_version(&self, version_label: &str) -> Result<Era, PipelineError> {
        let era = self.catalog.active_era(self.config.network)?;
        self.catalog.set_era_version(&era.era_id, version_label)
    }

    // Where ingestion should resume: one past the slowest dataset's
    // durable progress, or the configured start for a fresh deployment.
    pub fn resume_sequence(&self) -> Result<LedgerSequence, PipelineError> {
        let mut slowest: Option<LedgerSequence> = None;
        for kind in &self.kinds {
            let flushed = self.checkpoints.last_flushed(*kind)?;
            let buffered = self.hot.max_sequence(*kind)?.unwrap_or(0);
            let progress = flushed.max(buffered);
            slowest = Some(match slowest {
                Some(current) => current.min(progress),
                None => progress,
            });
        }

        Ok(match slowest {
            Some(0) | None => self.config.start_ledger,
            Some(progress) => progress + 1,
        })
    }

    pub fn extract_config(&self, era: &Era) -> ExtractConfig {
        ExtractConfig::new(
            self.config.network,
            era.era_id.clone(),
            era.version_label.clone(),
            self.config.ledger_range_size,
        )
    }

    // The full ingest path: source stream -> worker pool -> ordered
    // reassembly -> per-dataset hot buffer writers. Returns when the
    // stream ends or shutdown drains it.
    pub async fn run_ingest(
        &self,
        source: Arc<dyn SourceClient>,
        shutdown: ShutdownSignal,
    ) -> Result<(), PipelineError> {
        let era = self.ensure_era()?;
        let start = self.resume_sequence()?;
        info!(
            "ingest starting at ledger {} into era {} ({})",
            start, era.era_id, era.version_label
        );

        let input = source.stream(start, shutdown.clone()).await?;
        let registry = Arc::new(ExtractorRegistry::new(&self.kinds));

        let (pool, ordered) = WorkerPool::spawn(
            self.config.workers,
            registry,
            self.extract_config(&era),
            input,
            start,
            self.config.reassembly_buffer(),
            self.health.clone(),
            shutdown.clone(),
        );

        self.run_writers(ordered, &era).await?;
        pool.join().await;
        self.hot.flush()?;
        info!("ingest stopped");
        Ok(())
    }

    // Route ordered batch results into one writer task per dataset, so
    // inserts for a given dataset are applied in ledger order while
    // datasets proceed in parallel.
    async fn run_writers(
        &self,
        mut ordered: mpsc::Receiver<BatchResult>,
        era: &Era,
    ) -> Result<(), PipelineError> {
        let mut senders: HashMap<RowKind, mpsc::Sender<(LedgerSequence, Vec<Row>)>> =
            HashMap::with_capacity(self.kinds.len());
        let mut writers = Vec::with_capacity(self.kinds.len());

        for kind in &self.kinds {
            let (sender, mut receiver) =
                mpsc::channel::<(LedgerSequence, Vec<Row>)>(WRITER_CHANNEL_SIZE);
            senders.insert(*kind, sender);

            let hot = self.hot.clone();
            let health = self.health.clone();
            let kind = *kind;
            writers.push(tokio::spawn(async move {
                while let Some((sequence, rows)) = receiver.recv().await {
                    match hot.insert(kind, sequence, &rows) {
                        Ok(written) => {
                            metrics::counter!("lumenlake_rows_buffered").increment(written as u64);
                        }
                        Err(e) => {
                            error!("hot writer for {} failed at {}: {}", kind, sequence, e);
                            health.set(Component::HotWriter, ComponentState::Unhealthy);
                            return;
                        }
                    }
                }
                debug!("hot writer for {} drained", kind);
            }));
        }

        while let Some(result) = ordered.recv().await {
            self.catalog
                .observe_protocol(&era.era_id, result.protocol)?;

            for (kind, rows) in result.tables {
                if rows.is_empty() {
                    continue;
                }
                if let Some(sender) = senders.get(&kind) {
                    if sender.send((result.sequence, rows)).await.is_err() {
                        warn!("writer channel for {} closed", kind);
                        self.health.set(Component::HotWriter, ComponentState::Degraded);
                    }
                }
            }
        }

        drop(senders);
        for writer in writers {
            let _ = writer.await;
        }
        Ok(())
    }

    // Periodic flush loop; finishes an in-flight cycle on shutdown
    pub async fn run_flusher(&self, mut shutdown: ShutdownSignal) {
        let mut flusher = Flusher::new(
            &self.hot,
            &self.catalog,
            &self.lake,
            &self.pas,
            &self.checkpoints,
            &self.config,
            self.kinds.clone(),
        );
        let mut interval = tokio::time::interval(self.config.effective_flush_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick is skipped; a fresh daemon should not
        // flush an empty buffer just because it started
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            match flusher.flush_cycle().await {
                Ok(report) if report.failures.is_empty() => {
                    self.health.set(Component::Flusher, ComponentState::Healthy);
                }
                Ok(report) => {
                    // Failed datasets halted at their checkpoint and get
                    // retried next cycle; the rest of the cycle ran
                    error!("flush cycle had failures: {:?}", report.failures);
                    self.health.set(Component::Flusher, ComponentState::Degraded);
                }
                Err(e) => {
                    error!("flush cycle failed: {}", e);
                    self.health.set(Component::Flusher, ComponentState::Degraded);
                }
            }
        }

        // Final flush so a clean shutdown leaves nothing hot
        info!("final flush before shutdown");
        if let Err(e) = flusher.flush_cycle().await {
            warn!("final flush failed: {}", e);
        }
    }

    // One immediate cycle, used by tests and the shutdown path
    pub async fn flush_once(&self) -> Result<FlushReport, PipelineError> {
        let mut flusher = Flusher::new(
            &self.hot,
            &self.catalog,
            &self.lake,
            &self.pas,
            &self.checkpoints,
            &self.config,
            self.kinds.clone(),
        );
        flusher.flush_cycle().await
    }
}
