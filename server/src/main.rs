use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use superchat_common::streamer::StreamerProfile;
use superchat_common::transfer::TransferSource;
use superchat_server::api::{self, AppState};
use superchat_server::config::Cli;
use superchat_server::ledger::Ledger;
use superchat_server::poller;
use superchat_server::sui::SuiRpcClient;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(cli.log_level.as_deref().unwrap_or("info"))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Ledger ──
    let settings = cli.ledger_settings();
    match &settings.snapshot_file {
        Some(file) => info!("Ledger snapshot at {}", file.path().display()),
        None => info!("Running in memory, nothing will be persisted"),
    }
    let ledger = Arc::new(Ledger::open(settings).context("failed to open ledger")?);

    for address in &cli.watch {
        match StreamerProfile::new(address, None, Utc::now()) {
            Ok(profile) => {
                if ledger.streamer(&profile.address).await?.is_none() {
                    ledger.register_streamer(profile).await;
                }
            }
            Err(e) => warn!("Ignoring --watch {}: {}", address, e),
        }
    }

    // ── Transfer source ──
    let client = SuiRpcClient::new(&cli.rpc_url, cli.fetch_timeout())
        .context("failed to build Sui RPC client")?;
    info!("Reading transfers from {}", client.url());
    let source: Arc<dyn TransferSource> = Arc::new(client);

    let poller = cli
        .poll_interval()
        .map(|interval| poller::spawn(ledger.clone(), source.clone(), interval));
    if poller.is_none() {
        info!("Polling disabled; reconciliation runs only on request");
    }

    let app = api::router(Arc::new(AppState {
        ledger: ledger.clone(),
        source,
    }));

    let addr = cli.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Superchat server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await
        .context("server error")?;

    if let Some(poller) = poller {
        poller.shutdown().await;
    }
    Ok(())
}
