//! Nozzle Relay Server
//!
//! Subscribes to the Loggregator firehose on behalf of WebSocket clients and
//! relays only the events that pass the configured filter.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nozzle_core::RelayCounters;
use nozzle_core::tracing_init::{default_filter, init_tracing};

use nozzle_relay::config::Args;
use nozzle_relay::reporter::spawn_reporter;
use nozzle_relay::server::build_router;
use nozzle_relay::session::SessionCoordinator;
use nozzle_relay::upstream::DopplerFirehose;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&default_filter(args.debug), args.log_json);

    let config = args.into_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen,
        filter_mode = %config.filter_mode,
        doppler = %config.doppler.endpoint,
        "Starting nozzle-relay"
    );
    if config.doppler.skip_ssl_validation {
        warn!("Doppler TLS certificate verification is disabled");
    }

    // Build the allow-list tables before any session can consult them.
    nozzle_core::filter::init();

    let counters = Arc::new(RelayCounters::new());
    let firehose = Arc::new(DopplerFirehose::new(config.doppler.clone())?);
    let coordinator = SessionCoordinator::new(
        firehose,
        config.filter_mode,
        Arc::clone(&counters),
        config.session,
    );

    let shutdown = CancellationToken::new();
    let reporter = spawn_reporter(
        Arc::clone(&counters),
        config.report_interval,
        config.debug,
        shutdown.clone(),
    );

    let listener = TcpListener::bind(config.listen).await?;
    info!(addr = %listener.local_addr()?, "Relay server listening");

    let app = build_router(coordinator);
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = reporter.await {
        warn!(error = %e, "Reporter task failed");
    }
    info!("Relay server stopped");
    Ok(())
}
