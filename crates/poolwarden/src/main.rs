//! poolwarden daemon
//!
//! Keeps a machine pool at its desired size using the kameo pool controller

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::Result;
use eyre::eyre;
use kameo::actor::Spawn;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use poolwarden_api::{AlertSeverity, PoolEvent};
use poolwarden_core::{
    Configure, ControllerState, GetStatus, PoolControllerActor, PoolControllerArgs, Start, Stop,
};
use poolwarden_fetch::StateStore;

mod config;
mod factory;

use config::Config;
use factory::DefaultDriverFactory;

#[derive(Parser)]
#[command(name = "poolwarden")]
#[command(about = "Machine pool reconciliation daemon", long_about = None)]
struct Cli {
    /// Configuration file (defaults to POOLWARDEN_CONFIG or poolwarden.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for persisted state, overriding the configuration file
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let (config, source) = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config.daemon.log_level, cli.json_logs);

    match &source {
        Some(path) => info!(path = %path.display(), "configuration loaded"),
        None => warn!("no config file found, using defaults"),
    }

    let storage_dir = cli
        .storage_dir
        .unwrap_or_else(|| config.daemon.storage_dir());
    info!(storage_dir = %storage_dir.display(), "poolwarden starting");

    let args = PoolControllerArgs::new(Arc::new(DefaultDriverFactory::new()))
        .with_store(StateStore::new(storage_dir));
    let events = args.subscribe();
    let controller = PoolControllerActor::spawn(args);
    let event_logger = tokio::spawn(log_events(events));

    if let Some(pool) = config.pool {
        controller
            .ask(Configure { config: pool })
            .await
            .map_err(|e| eyre!("failed to configure pool: {e}"))?;
    }

    let status = controller
        .ask(GetStatus)
        .await
        .map_err(|e| eyre!("failed to query controller: {e}"))?;
    if status.state == ControllerState::Unconfigured {
        eyre::bail!("no pool configured; add a [pool] section to the configuration file");
    }

    controller
        .ask(Start)
        .await
        .map_err(|e| eyre!("failed to start pool controller: {e}"))?;
    info!(
        pool = status.pool_name.as_deref().unwrap_or_default(),
        desired_size = ?status.desired_size,
        "pool controller started"
    );

    tokio::signal::ctrl_c().await?;
    info!("received shutdown signal");

    if let Err(e) = controller.ask(Stop).await {
        warn!(error = %e, "failed to stop pool controller cleanly");
    }
    controller.stop_gracefully().await.ok();
    event_logger.abort();

    info!("poolwarden shutdown complete");
    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over `default_level`
fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log pool events until the controller goes away
async fn log_events(mut events: broadcast::Receiver<PoolEvent>) {
    loop {
        match events.recv().await {
            Ok(PoolEvent::Alert {
                topic,
                severity,
                message,
                ..
            }) => match severity {
                AlertSeverity::Error => error!(%topic, %message, "alert"),
                AlertSeverity::Warning => warn!(%topic, %message, "alert"),
                AlertSeverity::Info => info!(%topic, %message, "alert"),
            },
            Ok(event) => debug!(?event, "pool event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event logger lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
