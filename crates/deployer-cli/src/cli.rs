use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::WaitMode;

#[derive(Debug, Parser)]
#[command(name = "casper-deployer", version)]
#[command(about = "Install Wasm modules and call contracts on Casper", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every command. Anything left unset falls back to the config file, then
/// to built-in defaults.
#[derive(Debug, Default, Args)]
pub struct GlobalArgs {
    /// TOML file with default settings.
    #[arg(long, global = true, env = "CASPER_DEPLOYER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Node JSON-RPC endpoint.
    #[arg(long, global = true, env = "CASPER_NODE_RPC")]
    pub node_rpc: Option<String>,
    /// Event service REST endpoint.
    #[arg(long, global = true, env = "CASPER_EVENT_SERVICE")]
    pub event_service: Option<String>,
    /// Node SSE endpoint, needed for `--wait sse`.
    #[arg(long, global = true, env = "CASPER_SSE_URL")]
    pub sse_url: Option<String>,
    /// PEM file holding the account secret key.
    #[arg(long, global = true, env = "CASPER_SECRET_KEY")]
    pub secret_key: Option<PathBuf>,
    /// Hex encoded account public key.
    #[arg(long, global = true, env = "CASPER_PUBLIC_KEY")]
    pub public_key: Option<String>,
    /// Name of the target chain.
    #[arg(long, global = true, env = "CASPER_CHAIN_NAME")]
    pub chain_name: Option<String>,
    /// Timeout for a single network request, in seconds.
    #[arg(long, global = true)]
    pub request_timeout: Option<u64>,
    /// How to wait for the execution result.
    #[arg(long, global = true, value_enum)]
    pub wait: Option<WaitMode>,
    /// How long to wait for the execution result, in seconds.
    #[arg(long, global = true)]
    pub wait_timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install a compiled Wasm module.
    Deploy {
        /// Path to the Wasm module.
        #[arg(long)]
        module: Option<PathBuf>,
        /// Payment in CSPR.
        #[arg(long)]
        payment: Option<u64>,
    },
    /// Call an entry point of a stored contract.
    Call {
        /// Contract hash, as hex or `hash-<hex>`.
        #[arg(long)]
        contract_hash: String,
        /// Entry point to call.
        #[arg(long)]
        entry_point: Option<String>,
        /// Payment in CSPR.
        #[arg(long)]
        payment: Option<u64>,
    },
    /// Query a previously submitted deploy.
    Status {
        /// Deploy hash as hex.
        #[arg(long)]
        deploy_hash: String,
    },
}
