mod cli;
mod config;
mod flow;

use std::{error::Error as StdError, process::ExitCode};

use casper_deployer_sdk::{ExecutionStatus, hash_hex};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    cli::Cli,
    config::Config,
    flow::{EXIT_CONFIG, FlowError, Outcome},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::resolve(&cli.global) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match flow::dispatch(&config, cli.command).await {
        Ok(outcome) => {
            report(&outcome);
            ExitCode::from(outcome.exit_code())
        }
        Err(err) => {
            report_error(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn report(outcome: &Outcome) {
    println!("deploy hash: {}", hash_hex(&outcome.deploy_hash));
    match serde_json::to_string_pretty(&outcome.deploy_info) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!("Failed to render deploy info: {err}"),
    }
    match serde_json::to_string_pretty(&outcome.processed) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!("Failed to render execution result: {err}"),
    }

    match outcome.processed.status() {
        ExecutionStatus::Success => info!("Deploy executed successfully"),
        ExecutionStatus::Failure { message } => error!(%message, "Deploy execution failed"),
        ExecutionStatus::Expired => error!("Deploy expired before execution"),
        ExecutionStatus::Pending => info!("Deploy not executed yet"),
    }
}

fn report_error(err: &FlowError) {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    error!("{message}");

    if err.is_ambiguous_submission() {
        let hint = err
            .deploy_hash()
            .map(|hash| format!("casper-deployer status --deploy-hash {}", hash_hex(hash)))
            .unwrap_or_else(|| "casper-deployer status".to_string());
        warn!("The node may have accepted the deploy, check with `{hint}` before resubmitting");
    }
}
