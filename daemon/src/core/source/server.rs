use super::wire::{read_packet, write_packet, Packet};
use crate::core::{error::PipelineError, shutdown::ShutdownSignal};
use log::{debug, info, warn};
use lumenlake_common::ledger::{LedgerSequence, RawLedger};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Notify, RwLock},
};

// In-process ledger source: history in a map, subscribers woken on every
// append. Backs the demo source binary and the integration tests.
#[derive(Default)]
pub struct MemoryLedgerStore {
    ledgers: RwLock<BTreeMap<LedgerSequence, RawLedger>>,
    appended: Notify,
}

impl MemoryLedgerStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn push(&self, raw: RawLedger) {
        {
            let mut ledgers = self.ledgers.write().await;
            ledgers.insert(raw.sequence, raw);
        }
        self.appended.notify_waiters();
    }

    pub async fn get(&self, sequence: LedgerSequence) -> Option<RawLedger> {
        self.ledgers.read().await.get(&sequence).cloned()
    }

    pub async fn latest(&self) -> Option<LedgerSequence> {
        self.ledgers.read().await.keys().next_back().copied()
    }

    pub async fn remove(&self, sequence: LedgerSequence) {
        self.ledgers.write().await.remove(&sequence);
    }
}

// Serves the upstream wire contract over TCP: Hello, then either a
// streaming Request or a one-shot Get per connection.
pub struct UpstreamServer {
    listener: TcpListener,
    store: Arc<MemoryLedgerStore>,
}

impl UpstreamServer {
    pub async fn bind(
        address: &str,
        store: Arc<MemoryLedgerStore>,
    ) -> Result<Self, PipelineError> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, PipelineError> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            "upstream source listening on {:?}",
            self.listener.local_addr().ok()
        );

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown.cancelled() => return,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!("source connection from {}", peer);
                    let store = self.store.clone();
                    let signal = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, store, signal).await {
                            debug!("source connection from {} ended: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("source accept failed: {}", e);
                }
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    store: Arc<MemoryLedgerStore>,
    mut shutdown: ShutdownSignal,
) -> Result<(), PipelineError> {
    write_packet(&mut stream, &Packet::hello()).await?;

    let request = tokio::select! {
        packet = read_packet(&mut stream) => packet?,
        _ = shutdown.cancelled() => return Ok(()),
    };

    match request {
        Packet::Request { start_ledger } => {
            let mut next = start_ledger;
            loop {
                match store.get(next).await {
                    Some(raw) => {
                        let packet = Packet::Ledger(raw);
                        tokio::select! {
                            written = write_packet(&mut stream, &packet) => written?,
                            _ = shutdown.cancelled() => return Ok(()),
                        }
                        next = next.saturating_add(1);
                    }
                    None => {
                        // Caught up; arm the notification before re-checking
                        // so an append racing the lookup is never missed
                        let notified = store.appended.notified();
                        if store.get(next).await.is_some() {
                            continue;
                        }
                        tokio::select! {
                            _ = notified => {}
                            _ = shutdown.cancelled() => return Ok(()),
                        }
                    }
                }
            }
        }
        Packet::Get { sequence } => {
            let response = match store.get(sequence).await {
                Some(raw) => Packet::Ledger(raw),
                None => Packet::NotFound { sequence },
            };
            write_packet(&mut stream, &response).await
        }
        other => {
            let message = format!("unexpected request: {:?}", other);
            write_packet(&mut stream, &Packet::Error { message }).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shutdown;
    use crate::core::source::{SourceClient, UpstreamClient};
    use lumenlake_common::crypto::hash;

    fn raw(sequence: u32) -> RawLedger {
        RawLedger {
            sequence,
            payload: hash(&sequence.to_be_bytes()).as_bytes().to_vec(),
            close_time: 1_700_000_000_000_000 + sequence as u64,
            protocol: 21,
        }
    }

    #[tokio::test]
    async fn test_stream_delivers_in_order() {
        let store = MemoryLedgerStore::new();
        for seq in 1..=5u32 {
            store.push(raw(seq)).await;
        }

        let server = UpstreamServer::bind("127.0.0.1:0", store.clone()).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let (handle, signal) = shutdown::channel();
        tokio::spawn(server.run(signal));

        let client = UpstreamClient::new(address, 8);
        let mut receiver = client.stream(1, handle.subscribe()).await.unwrap();

        for expected in 1..=5u32 {
            let raw = receiver.recv().await.unwrap().unwrap();
            assert_eq!(raw.sequence, expected);
        }

        // Live tail: push another ledger and observe it
        store.push(raw(6)).await;
        let tail = receiver.recv().await.unwrap().unwrap();
        assert_eq!(tail.sequence, 6);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_get_one_shot() {
        let store = MemoryLedgerStore::new();
        store.push(raw(3)).await;

        let server = UpstreamServer::bind("127.0.0.1:0", store).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let (handle, signal) = shutdown::channel();
        tokio::spawn(server.run(signal));

        let client = UpstreamClient::new(address, 8);
        assert_eq!(client.get(3).await.unwrap().sequence, 3);
        assert!(matches!(
            client.get(9).await.unwrap_err(),
            PipelineError::NotFound(_)
        ));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_resume_after_reconnect_has_no_duplicates() {
        let store = MemoryLedgerStore::new();
        store.push(raw(1)).await;
        store.push(raw(2)).await;

        let server = UpstreamServer::bind("127.0.0.1:0", store.clone()).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let (server_handle, server_signal) = shutdown::channel();
        let server_task = tokio::spawn(server.run(server_signal));

        let (client_handle, _) = shutdown::channel();
        let client = UpstreamClient::new(address.clone(), 8);
        let mut receiver = client.stream(1, client_handle.subscribe()).await.unwrap();

        assert_eq!(receiver.recv().await.unwrap().unwrap().sequence, 1);
        assert_eq!(receiver.recv().await.unwrap().unwrap().sequence, 2);

        // Drop the server mid-stream, then bring a new one up on the same
        // port after the client has started backing off
        server_handle.shutdown();
        let _ = server_task.await;

        store.push(raw(3)).await;
        let server = UpstreamServer::bind(&address, store.clone()).await.unwrap();
        let (handle2, signal2) = shutdown::channel();
        tokio::spawn(server.run(signal2));

        // The client resumes at 3: no duplicate 1 or 2, no gap
        let resumed = receiver.recv().await.unwrap().unwrap();
        assert_eq!(resumed.sequence, 3);

        client_handle.shutdown();
        handle2.shutdown();
    }
}
