use std::time::Duration;

use casper_types::{DeployHash, Digest};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use casper_deployer_sdk::sse::{config::ListenerConfig, wait_for_deploy_processed};

#[derive(Debug, Parser)]
#[command(name = "watch_deploy")]
#[command(about = "Wait on a Casper SSE stream until a deploy is processed", long_about = None)]
struct Cli {
    endpoint: String,
    deploy_hash: String,
    #[arg(long, default_value_t = 180)]
    timeout_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let bytes: [u8; Digest::LENGTH] = hex::decode(cli.deploy_hash.trim())?
        .try_into()
        .map_err(|_| "deploy hash must be 32 bytes")?;
    let deploy_hash = DeployHash::new(Digest::from(bytes));

    let config = ListenerConfig::builder().with_endpoint(cli.endpoint).build()?;
    let processed =
        wait_for_deploy_processed(config, &deploy_hash, Duration::from_secs(cli.timeout_secs))
            .await?;

    println!("{}", serde_json::to_string_pretty(&processed)?);
    eprintln!("status: {:?}", processed.status());
    Ok(())
}
