mod client;
mod server;
mod wire;

pub use client::UpstreamClient;
pub use server::{MemoryLedgerStore, UpstreamServer};
pub use wire::Packet;

use crate::core::{error::PipelineError, shutdown::ShutdownSignal};
use async_trait::async_trait;
use lumenlake_common::ledger::{LedgerSequence, RawLedger};
use tokio::sync::mpsc;

// Ordered, resumable delivery of raw ledgers. Implementations must hand
// out strictly increasing sequences starting at `start_ledger` and fail
// the stream on any break; transient transport trouble is theirs to
// absorb with reconnection.
#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn stream(
        &self,
        start_ledger: LedgerSequence,
        shutdown: ShutdownSignal,
    ) -> Result<mpsc::Receiver<Result<RawLedger, PipelineError>>, PipelineError>;

    async fn get(&self, sequence: LedgerSequence) -> Result<RawLedger, PipelineError>;
}
