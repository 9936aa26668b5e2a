use super::wire::{read_packet, write_packet, Packet};
use super::SourceClient;
use crate::{
    config::{CIRCUIT_BREAKER_THRESHOLD, UPSTREAM_CONNECT_TIMEOUT_SECS},
    core::{
        error::PipelineError,
        retry::{Backoff, CircuitBreaker},
        shutdown::ShutdownSignal,
    },
};
use async_trait::async_trait;
use log::{debug, info, trace, warn};
use lumenlake_common::{
    config::WIRE_PROTOCOL_VERSION,
    ledger::{LedgerSequence, RawLedger},
};
use std::time::Duration;
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{sleep, timeout},
};

// Streaming client for the upstream ledger service. Maintains one
// persistent connection, reconnects with jittered exponential backoff and
// resumes from last_delivered + 1. Strictly increasing sequences are
// enforced here, before anything enters the pipeline.
pub struct UpstreamClient {
    address: String,
    channel_size: usize,
}

impl UpstreamClient {
    pub fn new(address: impl Into<String>, channel_size: usize) -> Self {
        Self {
            address: address.into(),
            channel_size: channel_size.max(1),
        }
    }

    async fn connect(address: &str) -> Result<TcpStream, PipelineError> {
        let stream = timeout(
            Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS),
            TcpStream::connect(address),
        )
        .await
        .map_err(|_| PipelineError::ConnectionLost("connect timed out".to_owned()))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    // Handshake: the server leads with Hello; an unknown wire version is
    // terminal, not a reconnect case.
    async fn handshake(stream: &mut TcpStream) -> Result<(), PipelineError> {
        match read_packet(stream).await? {
            Packet::Hello { wire_version } if wire_version == WIRE_PROTOCOL_VERSION => Ok(()),
            Packet::Hello { wire_version } => Err(PipelineError::SchemaMismatch(wire_version)),
            other => Err(PipelineError::ConnectionLost(format!(
                "expected Hello, got {:?}",
                other
            ))),
        }
    }

    async fn receive_loop(
        address: String,
        start_ledger: LedgerSequence,
        sender: mpsc::Sender<Result<RawLedger, PipelineError>>,
        mut shutdown: ShutdownSignal,
    ) {
        let mut next = start_ledger;
        let mut backoff = Backoff::reconnect();
        let mut breaker = CircuitBreaker::default();

        'reconnect: loop {
            if shutdown.is_shutdown() {
                return;
            }

            let mut stream = tokio::select! {
                connected = Self::connect(&address) => match connected {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("upstream connect to {} failed: {}", address, e);
                        if breaker.record_failure() {
                            // Surface the outage; the client keeps retrying
                            // in the background
                            let _ = sender
                                .send(Err(PipelineError::UpstreamUnavailable(
                                    CIRCUIT_BREAKER_THRESHOLD,
                                )))
                                .await;
                        }
                        let delay = backoff.next_delay();
                        debug!("reconnecting to {} in {:?}", address, delay);
                        tokio::select! {
                            _ = sleep(delay) => continue 'reconnect,
                            _ = shutdown.cancelled() => return,
                        }
                    }
                },
                _ = shutdown.cancelled() => return,
            };

            match Self::handshake(&mut stream).await {
                Ok(()) => {}
                Err(e @ PipelineError::SchemaMismatch(_)) => {
                    let _ = sender.send(Err(e)).await;
                    return;
                }
                Err(e) => {
                    warn!("upstream handshake failed: {}", e);
                    breaker.record_failure();
                    continue 'reconnect;
                }
            }

            if let Err(e) = write_packet(&mut stream, &Packet::Request { start_ledger: next }).await
            {
                warn!("upstream request failed: {}", e);
                breaker.record_failure();
                continue 'reconnect;
            }

            info!("upstream stream open from {} at ledger {}", address, next);
            backoff.reset();
            breaker.record_success();

            loop {
                let packet = tokio::select! {
                    packet = read_packet(&mut stream) => packet,
                    _ = shutdown.cancelled() => return,
                };

                match packet {
                    Ok(Packet::Ledger(raw)) => {
                        if raw.sequence != next {
                            // Gap or regression: fail the stream; ordering
                            // is a contract, not a recovery case
                            let _ = sender
                                .send(Err(PipelineError::SequenceBreak {
                                    expected: next,
                                    received: raw.sequence,
                                }))
                                .await;
                            return;
                        }

                        trace!("received ledger {}", raw.sequence);
                        metrics::counter!("lumenlake_ledgers_received").increment(1);
                        next = next.saturating_add(1);

                        tokio::select! {
                            sent = sender.send(Ok(raw)) => {
                                if sent.is_err() {
                                    // Consumer went away, nothing to stream for
                                    return;
                                }
                            }
                            _ = shutdown.cancelled() => return,
                        }
                    }
                    Ok(Packet::Error { message }) => {
                        warn!("upstream error: {}", message);
                        breaker.record_failure();
                        continue 'reconnect;
                    }
                    Ok(other) => {
                        warn!("unexpected upstream packet: {:?}", other);
                        breaker.record_failure();
                        continue 'reconnect;
                    }
                    Err(e) => {
                        warn!("upstream receive failed: {}", e);
                        if breaker.record_failure() {
                            let _ = sender
                                .send(Err(PipelineError::UpstreamUnavailable(
                                    CIRCUIT_BREAKER_THRESHOLD,
                                )))
                                .await;
                        }
                        let delay = backoff.next_delay();
                        tokio::select! {
                            _ = sleep(delay) => continue 'reconnect,
                            _ = shutdown.cancelled() => return,
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SourceClient for UpstreamClient {
    async fn stream(
        &self,
        start_ledger: LedgerSequence,
        shutdown: ShutdownSignal,
    ) -> Result<mpsc::Receiver<Result<RawLedger, PipelineError>>, PipelineError> {
        let (sender, receiver) = mpsc::channel(self.channel_size);
        let address = self.address.clone();
        tokio::spawn(Self::receive_loop(address, start_ledger, sender, shutdown));
        Ok(receiver)
    }

    async fn get(&self, sequence: LedgerSequence) -> Result<RawLedger, PipelineError> {
        let mut stream = Self::connect(&self.address).await?;
        Self::handshake(&mut stream).await?;
        write_packet(&mut stream, &Packet::Get { sequence }).await?;

        match read_packet(&mut stream).await? {
            Packet::Ledger(raw) if raw.sequence == sequence => Ok(raw),
            Packet::Ledger(raw) => Err(PipelineError::SequenceBreak {
                expected: sequence,
                received: raw.sequence,
            }),
            Packet::NotFound { sequence } => {
                Err(PipelineError::NotFound(format!("ledger {}", sequence)))
            }
            other => Err(PipelineError::ConnectionLost(format!(
                "unexpected response: {:?}",
                other
            ))),
        }
    }
}
