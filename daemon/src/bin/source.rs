// Standalone upstream source for demos and local development: serves
// synthetic ledgers over the ingest wire contract at a fixed rate.

use anyhow::Context;
use clap::Parser;
use log::info;
use lumenlake_common::{
    crypto::hash,
    ledger::{
        Asset, LedgerClose, Memo, MemoType, OpKind, OpRecord, RawLedger, TransferKind,
        TransferRecord, TxEnvelope,
    },
    prompt::{init_logger, LogLevel},
    time::get_current_time_in_micros,
};
use lumenlake_daemon::core::{
    shutdown,
    source::{MemoryLedgerStore, UpstreamServer},
};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "lumenlake_source",
    about = "Synthetic upstream ledger source",
    version,
    styles = lumenlake_common::get_cli_styles()
)]
struct SourceConfig {
    #[clap(long, default_value = "127.0.0.1:2125")]
    bind_address: String,

    // First ledger sequence to serve
    #[clap(long, default_value_t = 1)]
    start_ledger: u32,

    // Ledgers emitted per second
    #[clap(long, default_value_t = 1.0)]
    rate: f64,

    // Stop after this many ledgers; 0 keeps producing forever
    #[clap(long, default_value_t = 0)]
    count: u64,

    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    // Protocol version stamped on produced ledgers
    #[clap(long, default_value_t = 21)]
    protocol: u16,
}

fn synthetic_ledger(sequence: u32, protocol: u16) -> RawLedger {
    let amount = 100 + (sequence as i64 % 900);
    let close = LedgerClose {
        ledger_hash: hash(&sequence.to_be_bytes()),
        previous_hash: hash(&sequence.wrapping_sub(1).to_be_bytes()),
        total_coins: 1_000_000_000_000,
        fee_pool: 100_000 + sequence as u64,
        base_fee: 100,
        base_reserve: 5_000_000,
        max_tx_set_size: 1_000,
        transactions: vec![TxEnvelope {
            tx_hash: hash(&[b"tx", sequence.to_be_bytes().as_slice()].concat()),
            source_account: format!("GSRC{}", sequence % 7),
            account_sequence: sequence as u64,
            max_fee: 200,
            fee_charged: 100,
            successful: true,
            memo: Some(Memo {
                memo_type: MemoType::Id,
                value: Some(sequence.to_string()),
            }),
            operations: vec![OpRecord {
                kind: OpKind::Payment,
                source_account: None,
                destination: Some(format!("GDST{}", sequence % 11)),
                asset: Some(Asset::Native),
                amount: Some(amount),
                successful: true,
                effects: Vec::new(),
                trades: Vec::new(),
                transfers: vec![TransferRecord {
                    kind: TransferKind::Transfer,
                    from: Some(format!("GSRC{}", sequence % 7)),
                    to: Some(format!("GDST{}", sequence % 11)),
                    asset: Asset::Native,
                    amount,
                }],
            }],
            events: Vec::new(),
            changes: Vec::new(),
        }],
    };
    close.to_raw(sequence, get_current_time_in_micros(), protocol)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SourceConfig::parse();
    init_logger(config.log_level, None).context("logger initialization failed")?;

    let store = MemoryLedgerStore::new();
    let server = UpstreamServer::bind(&config.bind_address, store.clone())
        .await
        .context("failed to bind source server")?;
    info!("serving synthetic ledgers on {}", config.bind_address);

    let (shutdown_handle, shutdown_signal) = shutdown::channel();
    let server_task = tokio::spawn(server.run(shutdown_signal));

    let producer = tokio::spawn({
        let store = store.clone();
        async move {
            let interval = Duration::from_secs_f64(1.0 / config.rate.max(0.001));
            let mut sequence = config.start_ledger;
            let mut produced = 0u64;
            loop {
                store.push(synthetic_ledger(sequence, config.protocol)).await;
                sequence = sequence.saturating_add(1);
                produced += 1;
                if config.count > 0 && produced >= config.count {
                    info!("produced {} ledgers, idling", produced);
                    return;
                }
                tokio::time::sleep(interval).await;
            }
        }
    });

    tokio::signal::ctrl_c().await.ok();
    shutdown_handle.shutdown();
    producer.abort();
    let _ = server_task.await;
    Ok(())
}
