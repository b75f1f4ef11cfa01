//! Boots the assistant gateway: loads configuration, assembles the
//! `gateway_core` runtime (store, providers, tools, orchestrator, cron
//! scheduler), and serves HTTP until the process is asked to stop.

mod resolver;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use thiserror::Error;

use gateway_core::cron::{CronScheduler, SchedulerError};
use gateway_core::provider::ProviderRegistry;
use gateway_core::store::{StateStore, StoreError};
use gateway_core::tools::ToolRegistry;
use gateway_core::Orchestrator;
use gateway_serve::AppState;

use resolver::EnvAwareResolver;

const CRON_TICK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Personal AI-assistant gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Starts the HTTP server and cron dispatcher (the default).
    Serve,
    /// Prints the gateway's version and exits.
    Version,
}

#[derive(Debug, Error)]
pub enum BootError {
    #[error("load configuration: {0}")]
    Config(#[from] gateway_config::LoadError),
    #[error("load state store: {0}")]
    Store(#[from] StoreError),
    #[error("cron recovery: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("serve: {0}")]
    Serve(std::io::Error),
}

pub async fn run(cli: Cli) -> Result<(), BootError> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Version => {
            println!("gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Serve => serve().await,
    }
}

async fn serve() -> Result<(), BootError> {
    let config = gateway_config::load(None)?;
    tracing::info!(host = %config.host, port = config.port, data_dir = %config.data_dir.display(), "starting gateway");

    let store = Arc::new(StateStore::load(config.data_dir.join("state.json"))?);
    let providers = Arc::new(ProviderRegistry::new());

    let mut tools = ToolRegistry::with_builtins();
    let mut disabled = Vec::new();
    if !config.search_tool_enabled {
        disabled.push("search".to_string());
    }
    if !config.browser_tool_enabled {
        disabled.push("browser".to_string());
    }
    tools.disable(disabled);
    let tools = Arc::new(tools);

    let resolver = Arc::new(EnvAwareResolver::new(Arc::clone(&providers)));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&tools),
        Arc::clone(&providers),
        resolver,
        None,
    ));

    let leases_root = config.data_dir.join("cron-leases");
    let owner = format!("{}-{}", hostname_or_default(), std::process::id());
    let scheduler = CronScheduler::new(Arc::clone(&store), Arc::clone(&orchestrator), leases_root, owner);
    scheduler.recover()?;

    let ticker = Arc::clone(&scheduler);
    tokio::spawn(async move { ticker.run_forever(CRON_TICK_INTERVAL).await });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], config.port)));

    let state = Arc::new(AppState {
        store,
        orchestrator,
        tools,
        providers,
        scheduler,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| BootError::Bind(addr, e))?;
    tracing::info!(%addr, "gateway listening");

    tokio::select! {
        result = gateway_serve::run_serve_on_listener(listener, state) => result.map_err(BootError::Serve),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
    }
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "gateway".to_string())
}
