mod app;
mod constants;

use anyhow::Context;
use app::{router, AppState};
use clap::Parser;
use notary_core::{constants::VALIDATION_WINDOW_SECS, Chain, ChainStore, MemoryStore, SubmitConfig};
use notary_storage::SledStore;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8000
    #[arg(long, default_value = constants::DEFAULT_LISTEN)]
    listen: String,

    /// Data directory for sled
    #[arg(long, default_value = constants::DEFAULT_DATA_DIR)]
    data_dir: String,

    /// Keep the chain in memory only
    #[arg(long)]
    in_memory: bool,

    /// Seconds a signed challenge stays valid
    #[arg(long, default_value_t = VALIDATION_WINDOW_SECS)]
    validation_window: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args.listen.parse().context("invalid --listen address")?;
    let config = SubmitConfig {
        validation_window_secs: args.validation_window,
        ..SubmitConfig::default()
    };

    if args.in_memory {
        info!("using in-memory chain");
        serve(addr, Arc::new(MemoryStore::new()), config).await
    } else {
        info!(data_dir = %args.data_dir, "using sled chain");
        serve(addr, Arc::new(SledStore::open(&args.data_dir)?), config).await
    }
}

async fn serve<S: ChainStore + 'static>(
    addr: SocketAddr,
    store: Arc<S>,
    config: SubmitConfig,
) -> anyhow::Result<()> {
    let chain = Chain::new(store.clone())?;
    let (height, hash) = chain.tip()?;
    info!(height, tip = %hex::encode(hash), "chain loaded");

    let app = router(AppState::new(chain, config));

    info!("notary-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    store.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}
