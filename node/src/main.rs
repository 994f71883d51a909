// Copyright (c) 2026 CE Ledger Contributors. MIT License.
// See LICENSE for details.

//! # CE Ledger Node
//!
//! Entry point for the `ce-node` binary. Parses CLI arguments, initializes
//! logging and metrics, loads the hosted ledgers from the store, and serves
//! the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     : serve the hosted ledgers
//! - `deploy`  : deploy a ledger into the data directory
//! - `inspect` : print a deployed ledger's properties
//! - `version` : print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod store;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, RwLock};

use ce_contracts::LedgerConfig;
use ce_protocol::config::{EVENT_CHANNEL_CAPACITY, PROTOCOL_VERSION};
use ce_protocol::format_units;

use cli::{CeNodeCli, Commands};
use logging::LogFormat;
use metrics::NodeMetrics;
use store::LedgerStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CeNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args, cli.log_format).await,
        Commands::Deploy(args) => deploy_ledger(args, cli.log_format),
        Commands::Inspect(args) => inspect_ledger(args, cli.log_format),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("db")
}

/// Opens the store under `data_dir`, creating the directory when allowed.
fn open_store(data_dir: &Path, create: bool) -> Result<LedgerStore> {
    let path = db_path(data_dir);
    if create {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create database directory: {}", path.display()))?;
    } else if !path.exists() {
        anyhow::bail!("no ledger store at {}; deploy a ledger first", path.display());
    }
    let store = LedgerStore::open(&path).with_context(|| {
        format!(
            "failed to open ledger store at {} (is another ce-node using it?)",
            path.display()
        )
    })?;
    tracing::info!(path = %path.display(), "ledger store opened");
    Ok(store)
}

/// Serves the hosted ledgers until SIGINT or SIGTERM.
async fn run_node(args: cli::RunArgs, format: LogFormat) -> Result<()> {
    logging::init_logging("ce_node=info,ce_contracts=info,tower_http=debug", format);

    tracing::info!(
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting ce-node"
    );

    // --- Persistent storage ---
    let store = open_store(&args.data_dir, true)?;
    let host = store.load_host().context("failed to load ledgers from store")?;
    if host.is_empty() {
        tracing::warn!("no ledgers deployed yet; use `ce-node deploy` or the ledger_deploy method");
    }
    tracing::info!(stored = store.ledger_count(), hosted = host.len(), "ledgers loaded");

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.ledgers_hosted.set(host.len() as i64);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Application state ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            PROTOCOL_VERSION,
        ),
        host: Arc::new(RwLock::new(host)),
        store: Arc::new(store),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("ce-node stopped");
    Ok(())
}

/// Deploys a ledger into the store and prints a summary.
fn deploy_ledger(args: cli::DeployArgs, format: LogFormat) -> Result<()> {
    logging::init_logging("ce_node=info,ce_contracts=info", format);

    let config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read ledger config {}", path.display()))?;
            serde_json::from_str::<LedgerConfig>(&raw)
                .with_context(|| format!("invalid ledger config {}", path.display()))?
        }
        None => LedgerConfig::default(),
    };

    let store = open_store(&args.data_dir, true)?;
    let mut host = store.load_host().context("failed to load ledgers from store")?;

    let owner = args.owner.unwrap_or(args.deployer);
    let holder = args.holder.unwrap_or(owner);
    println!("Deploying ledger with the account: {}", args.deployer);

    let address = host
        .deploy(args.deployer, config, holder, owner)
        .context("deployment failed")?;
    let events = host.drain_events();
    let ledger = host.ledger(&address)?;
    store
        .commit(&host, &[ledger], &events)
        .context("failed to persist deployed ledger")?;

    let supply = format_units(ledger.total_supply(), ledger.decimals());
    println!("{} deployed to: {}", ledger.name(), address);
    println!();
    println!("--- {} deployed successfully ---", ledger.name());
    println!("  Ledger         : {}", address);
    println!("  Initial supply : {} {}", supply, ledger.symbol());
    println!("  Holder         : {}", holder);
    println!("  Owner          : {}", owner);
    println!("  Data directory : {}", args.data_dir.display());
    println!("----------------------------------------");

    Ok(())
}

/// Prints the properties of a stored ledger.
///
/// Fails when `--expected-owner` is given and does not match.
fn inspect_ledger(args: cli::InspectArgs, format: LogFormat) -> Result<()> {
    logging::init_logging("warn", format);

    let store = open_store(&args.data_dir, false)?;
    let ledger = store
        .get_ledger(&args.ledger)?
        .with_context(|| format!("no ledger deployed at {}", args.ledger))?;

    let owner = ledger
        .owner()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "none (renounced)".to_string());

    println!("Ledger information:");
    println!("  Address      : {}", ledger.address());
    println!("  Name         : {}", ledger.name());
    println!("  Symbol       : {}", ledger.symbol());
    println!("  Decimals     : {}", ledger.decimals());
    println!(
        "  Total supply : {} {}",
        format_units(ledger.total_supply(), ledger.decimals()),
        ledger.symbol()
    );
    println!("  Owner        : {}", owner);
    println!("  Holders      : {}", ledger.holder_count());
    println!("  Events       : {}", ledger.event_count());

    if let Some(expected) = args.expected_owner {
        let matches = ledger.owner() == Some(expected);
        println!();
        println!(
            "  Owner matches {} : {}",
            expected,
            if matches { "yes" } else { "no" }
        );
        if !matches {
            anyhow::bail!("owner mismatch: expected {}, found {}", expected, owner);
        }
    }

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("ce-node   {}", env!("CARGO_PKG_VERSION"));
    println!("protocol  {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
