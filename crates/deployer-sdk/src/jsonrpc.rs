//! JSONRPC client for submitting and querying deploys on a Casper network.
use std::time::Duration;

use casper_client::{self, JsonRpcId, Verbosity};
pub use casper_client::{
    Error as CasperClientRpcError,
    rpcs::results::{GetDeployResult, PutDeployResult},
};
use casper_types::DeployHash;
use rand::Rng;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::deploy::{SignedDeploy, hash_hex};

/// Upper bound on a single JSONRPC round trip unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// JSONRPC client for interacting with a Casper node or sidecar instance.
#[derive(Clone, Debug)]
pub struct CasperClient {
    network_name: String,
    rpc_endpoints: Vec<String>,
    verbosity: Verbosity,
    request_timeout: Duration,
}

impl CasperClient {
    /// Creates a new client using the provided network name and RPC endpoints.
    ///
    /// At least one endpoint must be provided. A trailing `/rpc` is stripped, the underlying
    /// client appends it on every call.
    pub fn new<N, I, S>(network_name: N, rpc_endpoints: I) -> Result<Self, CasperClientError>
    where
        N: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = rpc_endpoints
            .into_iter()
            .filter_map(|endpoint| {
                let endpoint: String = endpoint.into();
                normalize_node_address(&endpoint)
            })
            .collect();

        if endpoints.is_empty() {
            return Err(CasperClientError::MissingRpcEndpoints);
        }

        Ok(Self {
            network_name: network_name.into(),
            rpc_endpoints: endpoints,
            // Verbosity is set to low by default to avoid cluttering of stdout.
            verbosity: Verbosity::Low,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Returns the primary RPC endpoint configured for this client.
    pub fn rpc_endpoint(&self) -> &str {
        // safe: enforced in `new`.
        self.rpc_endpoints.first().expect("endpoint must exist")
    }

    /// Network name associated with this client.
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Submits a signed deploy and returns the hash the node accepted it under.
    ///
    /// The deploy is consumed and never retried here. On [`SubmitError::Ambiguous`] and
    /// [`SubmitError::TimedOut`] the node may or may not have accepted it; query its status
    /// before submitting a replacement.
    pub async fn put_deploy(&self, deploy: SignedDeploy) -> Result<DeployHash, SubmitError> {
        let local_hash = *deploy.hash();
        info!(
            deploy_hash = %hash_hex(&local_hash),
            endpoint = self.rpc_endpoint(),
            "Submitting deploy"
        );

        let call = casper_client::put_deploy(
            next_rpc_id(),
            self.rpc_endpoint(),
            self.verbosity,
            deploy.into_deploy(),
        );
        let response = match timeout(self.request_timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Err(self.classify_submit_error(error, local_hash)),
            Err(_) => {
                return Err(SubmitError::TimedOut {
                    deploy_hash: local_hash,
                    after: self.request_timeout,
                });
            }
        };

        let result: &PutDeployResult = &response.result;
        if result.deploy_hash != local_hash {
            warn!(
                local = %hash_hex(&local_hash),
                node = %hash_hex(&result.deploy_hash),
                "Node reported a different deploy hash"
            );
        }
        Ok(result.deploy_hash)
    }

    /// Fetches the deploy and its execution info as known to the node.
    pub async fn get_deploy(&self, deploy_hash: DeployHash) -> Result<GetDeployResult, QueryError> {
        debug!(deploy_hash = %hash_hex(&deploy_hash), "Querying deploy");
        let call = casper_client::get_deploy(
            next_rpc_id(),
            self.rpc_endpoint(),
            self.verbosity,
            deploy_hash,
            false,
        );
        match timeout(self.request_timeout, call).await {
            Ok(Ok(response)) => Ok(response.result),
            Ok(Err(CasperClientRpcError::ResponseIsRpcError { error, .. }))
                if is_missing_deploy_error(error.code, &error.message) =>
            {
                Err(QueryError::NotFound { deploy_hash })
            }
            Ok(Err(CasperClientRpcError::ResponseIsRpcError { error, .. })) => {
                Err(QueryError::Rpc {
                    code: error.code,
                    message: error.message,
                })
            }
            Ok(Err(error)) => Err(QueryError::Transport(Box::new(error))),
            Err(_) => Err(QueryError::TimedOut {
                after: self.request_timeout,
            }),
        }
    }

    fn classify_submit_error(
        &self,
        error: CasperClientRpcError,
        deploy_hash: DeployHash,
    ) -> SubmitError {
        match error {
            CasperClientRpcError::ResponseIsRpcError { error, .. } => SubmitError::Rejected {
                deploy_hash,
                code: error.code,
                message: error.message,
            },
            error if is_connect_failure(&error) => SubmitError::Unreachable {
                endpoint: self.rpc_endpoint().to_string(),
                source: Box::new(error),
            },
            error => SubmitError::Ambiguous {
                deploy_hash,
                source: Box::new(error),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum CasperClientError {
    #[error("no RPC endpoints configured")]
    MissingRpcEndpoints,
}

/// Outcome of a failed `account_put_deploy` call.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("node rejected deploy {}: {message} (code {code})", hash_hex(deploy_hash))]
    Rejected {
        deploy_hash: DeployHash,
        code: i64,
        message: String,
    },
    #[error("node at {endpoint} is unreachable, deploy was not sent: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: Box<CasperClientRpcError>,
    },
    #[error("outcome of submitting deploy {} is unknown: {source}", hash_hex(deploy_hash))]
    Ambiguous {
        deploy_hash: DeployHash,
        #[source]
        source: Box<CasperClientRpcError>,
    },
    #[error(
        "no response for deploy {} within {after:?}, outcome is unknown",
        hash_hex(deploy_hash)
    )]
    TimedOut {
        deploy_hash: DeployHash,
        after: Duration,
    },
}

impl SubmitError {
    /// Whether the node may have accepted the deploy despite the error.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            SubmitError::Ambiguous { .. } | SubmitError::TimedOut { .. }
        )
    }

    pub fn deploy_hash(&self) -> Option<&DeployHash> {
        match self {
            SubmitError::Rejected { deploy_hash, .. }
            | SubmitError::Ambiguous { deploy_hash, .. }
            | SubmitError::TimedOut { deploy_hash, .. } => Some(deploy_hash),
            SubmitError::Unreachable { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("deploy {} is not known to the node", hash_hex(deploy_hash))]
    NotFound { deploy_hash: DeployHash },
    #[error("node returned an error: {message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("casper client error: {0}")]
    Transport(Box<CasperClientRpcError>),
    #[error("no response within {after:?}")]
    TimedOut { after: Duration },
}

/// Generates the next JSONRPC ID.
fn next_rpc_id() -> JsonRpcId {
    let value: i64 = rand::rng().random();
    JsonRpcId::from(value)
}

/// Normalizes a node address by removing trailing slashes and `/rpc` suffixes.
fn normalize_node_address(endpoint: &str) -> Option<String> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_trailing_slash = trimmed.trim_end_matches('/');
    let cleaned = if let Some(stripped) = without_trailing_slash.strip_suffix("/rpc") {
        stripped.trim_end_matches('/').to_owned()
    } else {
        without_trailing_slash.to_owned()
    };

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Whether the request failed before a connection to the node was established.
///
/// Transport failures arrive as `FailedToGetResponse`, which does not expose the underlying
/// `reqwest::Error` as its source.
fn is_connect_failure(error: &CasperClientRpcError) -> bool {
    matches!(
        error,
        CasperClientRpcError::FailedToGetResponse { error, .. } if error.is_connect()
    )
}

/// Determines if the provided error code and message indicate an unknown deploy.
///
/// Like account lookups, the node reports this with a generic code on some versions, so the
/// message is inspected as well.
fn is_missing_deploy_error(code: i64, message: &str) -> bool {
    const NO_SUCH_DEPLOY_CODE: i64 = -32000;

    if code == NO_SUCH_DEPLOY_CODE {
        return true;
    }

    let message = message.to_ascii_lowercase();
    message.contains("no such deploy")
        || message.contains("no such transaction")
        || message.contains("deploy not known")
        || message.contains("not found")
}
