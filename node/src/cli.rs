//! # CLI Interface
//!
//! Command-line arguments of `ce-node`, defined with `clap` derive. Four
//! subcommands: `run`, `deploy`, `inspect` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ce_protocol::config::{DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use ce_protocol::Address;

use crate::logging::LogFormat;

/// CE ledger node.
///
/// Hosts CE token ledgers, persists their state and event journal, and
/// serves them over JSON-RPC, REST and WebSocket, with Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "ce-node",
    about = "CE token ledger node",
    version,
    propagate_version = true
)]
pub struct CeNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "CE_LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the hosted ledgers.
    Run(RunArgs),
    /// Deploy a new ledger into the data directory and print its address.
    Deploy(DeployArgs),
    /// Print the properties of a deployed ledger.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the ledger store. Created on first run.
    #[arg(long, short = 'd', env = "CE_DATA_DIR", default_value = ".ce")]
    pub data_dir: PathBuf,

    /// Address to bind the RPC and metrics listeners on.
    #[arg(long, env = "CE_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the JSON-RPC, REST and WebSocket API.
    #[arg(long, env = "CE_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

/// Arguments for the `deploy` subcommand.
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Directory holding the ledger store.
    #[arg(long, short = 'd', env = "CE_DATA_DIR", default_value = ".ce")]
    pub data_dir: PathBuf,

    /// Ledger configuration (JSON). Missing fields take the CE token
    /// defaults; without a file the CE token itself is deployed.
    #[arg(long, short = 'c', env = "CE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deploying account. Its deployment count determines the ledger address.
    #[arg(long)]
    pub deployer: Address,

    /// Account receiving the initial supply. Defaults to the owner.
    #[arg(long)]
    pub holder: Option<Address>,

    /// Initial owner. Defaults to the deployer.
    #[arg(long)]
    pub owner: Option<Address>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Directory holding the ledger store.
    #[arg(long, short = 'd', env = "CE_DATA_DIR", default_value = ".ce")]
    pub data_dir: PathBuf,

    /// Address of the ledger to inspect.
    pub ledger: Address,

    /// Owner the ledger is expected to have; reported as a check.
    #[arg(long)]
    pub expected_owner: Option<Address>,
}
