use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use lumenlake_common::{config::VERSION, prompt::init_logger};
use lumenlake_daemon::{
    config::{Config, SHUTDOWN_GRACE_SECS},
    core::{pipeline::Pipeline, shutdown, source::UpstreamClient},
    rpc,
};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    // Invalid configuration never gets as far as opening stores
    config
        .validate()
        .context("configuration validation failed")?;
    init_logger(config.log_level, config.log_file.as_deref())
        .context("logger initialization failed")?;

    info!("lumenlake daemon v{} starting on {}", VERSION, config.network);

    let pipeline =
        Arc::new(Pipeline::open(config.clone()).context("failed to open pipeline stores")?);
    let (shutdown_handle, shutdown_signal) = shutdown::channel();

    let source = Arc::new(UpstreamClient::new(
        config.upstream_address.clone(),
        config.queue_size(),
    ));

    let ingest = tokio::spawn({
        let pipeline = pipeline.clone();
        let signal = shutdown_signal.clone();
        async move {
            if let Err(e) = pipeline.run_ingest(source, signal).await {
                error!("ingest failed: {}", e);
            }
        }
    });

    let flusher = tokio::spawn({
        let pipeline = pipeline.clone();
        let signal = shutdown_signal.clone();
        async move {
            pipeline.run_flusher(signal).await;
        }
    });

    let server = tokio::spawn({
        let pipeline = pipeline.clone();
        let signal = shutdown_signal.clone();
        async move {
            if let Err(e) = rpc::serve(pipeline, signal).await {
                error!("rpc server failed: {}", e);
            }
        }
    });

    wait_for_termination().await;
    info!("termination signal received, draining");
    shutdown_handle.shutdown();

    // Drain everything within the grace window: workers finish their
    // ledgers, the flusher completes its cycle and persists checkpoints
    let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
    if timeout(grace, async {
        let _ = ingest.await;
        let _ = flusher.await;
        let _ = server.await;
    })
    .await
    .is_err()
    {
        warn!("grace window of {:?} elapsed, exiting anyway", grace);
    }

    info!("lumenlake daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}
