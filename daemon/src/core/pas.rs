use crate::core::{
    catalog::Catalog,
    error::PipelineError,
    store::{pas_path, Lake, PAS_PREFIX},
};
use bytes::Bytes;
use log::{debug, info};
use lumenlake_common::{
    config::PAS_GENESIS_HASH,
    pas::{verify_chain, PasBatch, PasBody, PasEvent},
    time::get_current_time_in_micros,
};

// Writer side of the provenance audit stream. One event per committed
// flush; the chain head lives on the era so strict resolution can pin it.
pub struct PasLog {
    lake: Lake,
    producer: String,
}

impl PasLog {
    pub fn new(lake: Lake, producer: impl Into<String>) -> Self {
        Self {
            lake,
            producer: producer.into(),
        }
    }

    // Seal a new chain link on top of the era's current head, persist it
    // and advance the head. Returns the sealed event.
    pub async fn append(
        &self,
        catalog: &Catalog,
        era_id: &str,
        batch: PasBatch,
    ) -> Result<PasEvent, PipelineError> {
        let era = catalog.get_era(era_id)?;
        let previous_hash = era.pas_chain_head.unwrap_or(PAS_GENESIS_HASH);

        let body = PasBody {
            timestamp: get_current_time_in_micros(),
            producer: self.producer.clone(),
            batch,
        };
        let event = PasEvent::seal(previous_hash, body)?;

        let path = pas_path(
            event.body.batch.ledger_start,
            event.body.batch.ledger_end,
            event.body.timestamp,
        );
        let bytes = serde_json::to_vec_pretty(&event)?;
        self.lake.put(&path, Bytes::from(bytes)).await?;

        catalog.set_pas_chain_head(era_id, event.event_hash.clone())?;
        debug!(
            "pas event sealed for [{}, {}]: {}",
            event.body.batch.ledger_start, event.body.batch.ledger_end, event.event_hash
        );
        Ok(event)
    }

    // All persisted events in chain order
    pub async fn read_chain(&self) -> Result<Vec<PasEvent>, PipelineError> {
        let mut events = Vec::new();
        for (path, _) in self.lake.list_prefix(PAS_PREFIX).await? {
            let bytes = self.lake.get(&path).await?;
            let event: PasEvent = serde_json::from_slice(&bytes)?;
            events.push(event);
        }
        events.sort_by_key(|event| event.body.timestamp);
        Ok(events)
    }

    // Full chain integrity check from genesis; fails on the first break
    pub async fn verify(&self) -> Result<usize, PipelineError> {
        let events = self.read_chain().await?;
        verify_chain(&PAS_GENESIS_HASH, &events)?;
        info!("pas chain verified: {} events", events.len());
        Ok(events.len())
    }
}
