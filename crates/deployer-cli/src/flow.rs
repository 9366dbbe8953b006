//! The install and invoke workflows: load keys, build, sign, submit, then follow the deploy.
use std::path::PathBuf;

use casper_deployer_sdk::{
    BuildError, CasperClient, CasperClientError, DeployParams, EventServiceClient,
    EventServiceError, ExecutionStatus, KeyError, KeyPair, Payment, ProcessedDeploy, QueryError,
    Session, SignError, SubmitError, compose, hash_hex,
    jsonrpc::GetDeployResult,
    sse::{self, ListenerError, config::ListenerConfig, config::ListenerConfigError},
};
use casper_types::{DeployHash, Digest, RuntimeArgs};
use thiserror::Error;
use tracing::info;

use crate::{
    cli::Command,
    config::{Config, ConfigError, WaitMode},
};

pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_AMBIGUOUS_SUBMISSION: u8 = 3;
pub const EXIT_EXECUTION_FAILED: u8 = 4;

/// What a run deploys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Install {
        module_path: PathBuf,
        payment_cspr: u64,
    },
    Invoke {
        contract_hash: String,
        entry_point: String,
        payment_cspr: u64,
    },
}

impl Mode {
    fn payment_cspr(&self) -> u64 {
        match self {
            Mode::Install { payment_cspr, .. } | Mode::Invoke { payment_cspr, .. } => {
                *payment_cspr
            }
        }
    }

    fn session(&self) -> Result<Session, BuildError> {
        match self {
            Mode::Install { module_path, .. } => {
                Session::install_from_file(module_path, RuntimeArgs::new())
            }
            Mode::Invoke {
                contract_hash,
                entry_point,
                ..
            } => Session::invoke_hex(contract_hash, entry_point.as_str(), RuntimeArgs::new()),
        }
    }
}

/// Everything learned about a deploy.
#[derive(Debug)]
pub struct Outcome {
    pub deploy_hash: DeployHash,
    pub deploy_info: GetDeployResult,
    pub processed: ProcessedDeploy,
}

impl Outcome {
    /// Process exit code for a run that got this far.
    pub fn exit_code(&self) -> u8 {
        match self.processed.status() {
            ExecutionStatus::Failure { .. } | ExecutionStatus::Expired => EXIT_EXECUTION_FAILED,
            ExecutionStatus::Success | ExecutionStatus::Pending => 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("load keys: {0}")]
    LoadKeys(#[from] KeyError),
    #[error("build deploy: {0}")]
    Build(#[from] BuildError),
    #[error("sign deploy: {0}")]
    Sign(#[from] SignError),
    #[error("set up node client: {0}")]
    Client(#[from] CasperClientError),
    #[error("submit deploy: {0}")]
    Submit(#[from] SubmitError),
    #[error("invalid deploy hash `{0}`")]
    DeployHash(String),
    #[error("query deploy {}: {source}", hash_hex(deploy_hash))]
    QueryDeploy {
        deploy_hash: DeployHash,
        #[source]
        source: QueryError,
    },
    #[error("await execution of deploy {}: {source}", hash_hex(deploy_hash))]
    AwaitEventService {
        deploy_hash: DeployHash,
        #[source]
        source: EventServiceError,
    },
    #[error("await execution of deploy {}: {source}", hash_hex(deploy_hash))]
    AwaitStream {
        deploy_hash: DeployHash,
        #[source]
        source: ListenerError,
    },
    #[error("set up event stream: {0}")]
    Stream(#[from] ListenerConfigError),
}

impl FlowError {
    /// Hash of a deploy that reached the node, or may have.
    pub fn deploy_hash(&self) -> Option<&DeployHash> {
        match self {
            FlowError::Submit(error) => error.deploy_hash(),
            FlowError::QueryDeploy { deploy_hash, .. }
            | FlowError::AwaitEventService { deploy_hash, .. }
            | FlowError::AwaitStream { deploy_hash, .. } => Some(deploy_hash),
            _ => None,
        }
    }

    pub fn is_ambiguous_submission(&self) -> bool {
        matches!(self, FlowError::Submit(error) if error.is_ambiguous())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            FlowError::Config(_) => EXIT_CONFIG,
            _ if self.is_ambiguous_submission() => EXIT_AMBIGUOUS_SUBMISSION,
            _ => EXIT_FAILURE,
        }
    }
}

/// Runs a subcommand against the configured network.
pub async fn dispatch(config: &Config, command: Command) -> Result<Outcome, FlowError> {
    match command {
        Command::Deploy { module, payment } => {
            let mode = Mode::Install {
                module_path: module.unwrap_or_else(|| config.module_path.clone()),
                payment_cspr: payment.unwrap_or(config.install_payment_cspr),
            };
            run(config, mode).await
        }
        Command::Call {
            contract_hash,
            entry_point,
            payment,
        } => {
            let mode = Mode::Invoke {
                contract_hash,
                entry_point: entry_point.unwrap_or_else(|| config.entry_point.clone()),
                payment_cspr: payment.unwrap_or(config.call_payment_cspr),
            };
            run(config, mode).await
        }
        Command::Status { deploy_hash } => status(config, &deploy_hash).await,
    }
}

/// Builds, signs and submits one deploy, then follows it to execution.
pub async fn run(config: &Config, mode: Mode) -> Result<Outcome, FlowError> {
    let (secret_key, public_key) = config.signing_keys()?;
    let key_pair = KeyPair::load(secret_key, public_key)?;
    info!(account = %key_pair.public_key().to_account_hash().to_formatted_string(), "Loaded keys");

    let payment = Payment::from_cspr(mode.payment_cspr())?;
    let session = mode.session()?;
    let params = DeployParams::now(key_pair.public_key().clone(), config.chain_name.as_str());
    let deploy = compose(params, payment, session)?.sign(&key_pair)?;

    let client = node_client(config)?;
    let deploy_hash = client.put_deploy(deploy).await?;
    info!(deploy_hash = %hash_hex(&deploy_hash), "Deploy accepted");

    follow(config, &client, deploy_hash, config.wait).await
}

/// Reports on an earlier deploy without waiting for it.
pub async fn status(config: &Config, deploy_hash_hex: &str) -> Result<Outcome, FlowError> {
    let deploy_hash = parse_deploy_hash(deploy_hash_hex)?;
    let client = node_client(config)?;
    follow(config, &client, deploy_hash, WaitMode::Once).await
}

async fn follow(
    config: &Config,
    client: &CasperClient,
    deploy_hash: DeployHash,
    wait: WaitMode,
) -> Result<Outcome, FlowError> {
    let deploy_info = client
        .get_deploy(deploy_hash)
        .await
        .map_err(|source| FlowError::QueryDeploy {
            deploy_hash,
            source,
        })?;

    let processed = match wait {
        WaitMode::Sse => {
            let endpoint = config
                .sse_url
                .clone()
                .ok_or(ConfigError::Missing("sse-url"))?;
            let listener = ListenerConfig::builder().with_endpoint(endpoint).build()?;
            sse::wait_for_deploy_processed(listener, &deploy_hash, config.wait_timeout)
                .await
                .map_err(|source| FlowError::AwaitStream {
                    deploy_hash,
                    source,
                })?
        }
        WaitMode::Rest | WaitMode::Once => {
            let events = EventServiceClient::new(&config.event_service, config.request_timeout)
                .map_err(|source| FlowError::AwaitEventService {
                    deploy_hash,
                    source,
                })?;
            let result = if wait == WaitMode::Rest {
                events
                    .wait_for_processed(&deploy_hash, config.poll_config())
                    .await
            } else {
                events.get_processed_deploy(&deploy_hash).await
            };
            result.map_err(|source| FlowError::AwaitEventService {
                deploy_hash,
                source,
            })?
        }
    };

    Ok(Outcome {
        deploy_hash,
        deploy_info,
        processed,
    })
}

fn node_client(config: &Config) -> Result<CasperClient, FlowError> {
    Ok(
        CasperClient::new(config.chain_name.as_str(), [config.node_rpc.as_str()])?
            .with_request_timeout(config.request_timeout),
    )
}

fn parse_deploy_hash(input: &str) -> Result<DeployHash, FlowError> {
    let bytes: [u8; Digest::LENGTH] = hex::decode(input.trim())
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| FlowError::DeployHash(input.to_string()))?;
    Ok(DeployHash::new(Digest::from(bytes)))
}
