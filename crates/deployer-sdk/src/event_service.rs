//! Client for the event service REST API, which reports what happened to a deploy after the
//! node executed it.
use std::time::Duration;

use casper_types::DeployHash;
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};
use url::Url;

use crate::deploy::hash_hex;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Error)]
pub enum EventServiceError {
    #[error("invalid event service URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("deploy {} is not known to the event service", hash_hex(deploy_hash))]
    NotFound { deploy_hash: DeployHash },
    #[error("event service at {endpoint} is unreachable: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("event service answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode event service response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("deploy {} still pending after {after:?}", hash_hex(deploy_hash))]
    TimedOut {
        deploy_hash: DeployHash,
        after: Duration,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Everything the event service knows about one deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDeploy {
    pub deploy_hash: String,
    #[serde(default)]
    pub deploy_accepted: Option<Value>,
    #[serde(default)]
    pub deploy_processed: Option<Value>,
    #[serde(default)]
    pub deploy_expired: bool,
}

/// Execution outcome derived from a [`ProcessedDeploy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failure { message: String },
    Expired,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Pending)
    }
}

impl ProcessedDeploy {
    /// Builds a record from a single `DeployProcessed` payload, as seen on the event stream.
    pub fn from_processed_event(deploy_hash: &DeployHash, processed: Value) -> Self {
        Self {
            deploy_hash: hash_hex(deploy_hash),
            deploy_accepted: None,
            deploy_processed: Some(processed),
            deploy_expired: false,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match &self.deploy_processed {
            Some(processed) => execution_status(processed),
            None if self.deploy_expired => ExecutionStatus::Expired,
            None => ExecutionStatus::Pending,
        }
    }
}

/// Reads the status out of a processed payload.
///
/// Handles the bare payload and the `{"DeployProcessed": {...}}` envelope, and the legacy
/// (`Success`/`Failure`) as well as the versioned (`Version1`/`Version2`) execution results.
fn execution_status(processed: &Value) -> ExecutionStatus {
    let processed = processed.get("DeployProcessed").unwrap_or(processed);
    let Some(result) = processed.get("execution_result") else {
        return ExecutionStatus::Pending;
    };
    let result = result.get("Version1").unwrap_or(result);

    if result.get("Success").is_some() {
        return ExecutionStatus::Success;
    }
    if let Some(failure) = result.get("Failure") {
        return ExecutionStatus::Failure {
            message: error_message(failure),
        };
    }
    if let Some(v2) = result.get("Version2") {
        return match v2.get("error_message") {
            Some(Value::String(message)) => ExecutionStatus::Failure {
                message: message.clone(),
            },
            _ => ExecutionStatus::Success,
        };
    }
    ExecutionStatus::Pending
}

fn error_message(failure: &Value) -> String {
    failure
        .get("error_message")
        .and_then(Value::as_str)
        .unwrap_or("execution failed")
        .to_string()
}

/// How long and how often [`EventServiceClient::wait_for_processed`] polls.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// REST client for an event service (`GET /deploy/<hash>`).
#[derive(Debug, Clone)]
pub struct EventServiceClient {
    base_url: Url,
    http: reqwest::Client,
}

impl EventServiceClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, EventServiceError> {
        let mut base_url = Url::parse(base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(EventServiceError::Client)?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Queries the service once.
    pub async fn get_processed_deploy(
        &self,
        deploy_hash: &DeployHash,
    ) -> Result<ProcessedDeploy, EventServiceError> {
        let url = self
            .base_url
            .join(&format!("deploy/{}", hash_hex(deploy_hash)))?;
        debug!(%url, "Querying event service");

        let response =
            self.http
                .get(url)
                .send()
                .await
                .map_err(|source| EventServiceError::Connection {
                    endpoint: self.base_url.to_string(),
                    source,
                })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(EventServiceError::NotFound {
                deploy_hash: *deploy_hash,
            }),
            status if status.is_success() => response
                .json::<ProcessedDeploy>()
                .await
                .map_err(EventServiceError::Decode),
            status => Err(EventServiceError::Status {
                status,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Polls until the deploy has a terminal status or `config.timeout` elapses.
    ///
    /// A deploy the service has not indexed yet is treated as pending. If it never shows up,
    /// the result is [`EventServiceError::NotFound`]; if it shows up but never finishes,
    /// [`EventServiceError::TimedOut`]. Any other error ends the wait immediately.
    pub async fn wait_for_processed(
        &self,
        deploy_hash: &DeployHash,
        config: PollConfig,
    ) -> Result<ProcessedDeploy, EventServiceError> {
        let started = Instant::now();
        let deadline = started + config.timeout;
        let mut attempt = 0u32;
        let mut seen = false;

        loop {
            attempt += 1;
            match self.get_processed_deploy(deploy_hash).await {
                Ok(processed) if processed.status().is_terminal() => {
                    info!(
                        deploy_hash = %hash_hex(deploy_hash),
                        attempts = attempt,
                        "Deploy processed"
                    );
                    return Ok(processed);
                }
                Ok(_) => seen = true,
                Err(EventServiceError::NotFound { .. }) => {}
                Err(error) => return Err(error),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(if seen {
                    EventServiceError::TimedOut {
                        deploy_hash: *deploy_hash,
                        after: now - started,
                    }
                } else {
                    EventServiceError::NotFound {
                        deploy_hash: *deploy_hash,
                    }
                });
            }

            let delay = calculate_backoff(attempt, config.interval, config.max_interval)
                .min(deadline - now);
            debug!(attempt, ?delay, seen, "Deploy not processed yet");
            sleep(delay).await;
        }
    }
}

/// Exponential backoff capped at `max`, plus up to 10% jitter.
fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1 << exponent).min(max);

    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::rng().random_range(0..jitter_range)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn deploy_hash() -> DeployHash {
        DeployHash::new([0xabu8; 32].into())
    }

    fn fast_polling(timeout: Duration) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(20),
            timeout,
        }
    }

    fn processed_body(execution_result: Value) -> String {
        let hash = hash_hex(&deploy_hash());
        json!({
            "deploy_hash": hash,
            "deploy_accepted": { "hash": hash },
            "deploy_processed": {
                "deploy_hash": hash,
                "block_hash": "00".repeat(32),
                "execution_result": execution_result,
            },
            "deploy_expired": false,
        })
        .to_string()
    }

    #[test]
    fn test_status_from_legacy_results() {
        let success = ProcessedDeploy::from_processed_event(
            &deploy_hash(),
            json!({ "execution_result": { "Success": { "cost": "100" } } }),
        );
        assert_eq!(success.status(), ExecutionStatus::Success);

        let failure = ProcessedDeploy::from_processed_event(
            &deploy_hash(),
            json!({ "execution_result": { "Failure": { "error_message": "User error: 1" } } }),
        );
        assert_eq!(
            failure.status(),
            ExecutionStatus::Failure {
                message: "User error: 1".to_string()
            }
        );
    }

    #[test]
    fn test_status_from_versioned_results() {
        let v1 = ProcessedDeploy::from_processed_event(
            &deploy_hash(),
            json!({ "DeployProcessed": { "execution_result": { "Version1": { "Success": {} } } } }),
        );
        assert_eq!(v1.status(), ExecutionStatus::Success);

        let v2_ok = ProcessedDeploy::from_processed_event(
            &deploy_hash(),
            json!({ "execution_result": { "Version2": { "error_message": null } } }),
        );
        assert_eq!(v2_ok.status(), ExecutionStatus::Success);

        let v2_err = ProcessedDeploy::from_processed_event(
            &deploy_hash(),
            json!({ "execution_result": { "Version2": { "error_message": "Out of gas" } } }),
        );
        assert_eq!(
            v2_err.status(),
            ExecutionStatus::Failure {
                message: "Out of gas".to_string()
            }
        );
    }

    #[test]
    fn test_status_pending_and_expired() {
        let mut record = ProcessedDeploy {
            deploy_hash: hash_hex(&deploy_hash()),
            deploy_accepted: Some(json!({})),
            deploy_processed: None,
            deploy_expired: false,
        };
        assert_eq!(record.status(), ExecutionStatus::Pending);
        assert!(!record.status().is_terminal());

        record.deploy_expired = true;
        assert_eq!(record.status(), ExecutionStatus::Expired);
        assert!(record.status().is_terminal());
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);
        assert!(calculate_backoff(1, base, max) >= base);
        assert!(calculate_backoff(2, base, max) >= Duration::from_millis(200));
        let capped = calculate_backoff(30, base, max);
        assert!(capped >= max && capped < max + Duration::from_millis(100));
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(matches!(
            EventServiceClient::new("not a url", Duration::from_secs(1)),
            Err(EventServiceError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_get_processed_deploy_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/deploy/{}", hash_hex(&deploy_hash())).as_str())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(processed_body(json!({ "Success": { "cost": "123" } })))
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let processed = client
            .get_processed_deploy(&deploy_hash())
            .await
            .expect("should fetch");

        assert_eq!(processed.deploy_hash, hash_hex(&deploy_hash()));
        assert_eq!(processed.status(), ExecutionStatus::Success);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_processed_deploy_unknown_hash() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/deploy/{}", hash_hex(&deploy_hash())).as_str())
            .with_status(404)
            .with_body(r#"{"code":404,"message":"Query returned no data"}"#)
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let result = client.get_processed_deploy(&deploy_hash()).await;

        assert!(matches!(result, Err(EventServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_get_processed_deploy_server_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/deploy/{}", hash_hex(&deploy_hash())).as_str())
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let result = client.get_processed_deploy(&deploy_hash()).await;

        assert!(matches!(
            result,
            Err(EventServiceError::Status { status, ref body })
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "boom"
        ));
    }

    #[tokio::test]
    async fn test_get_processed_deploy_unreachable() {
        let client = EventServiceClient::new("http://127.0.0.1:1", Duration::from_secs(5))
            .expect("valid url");
        let result = client.get_processed_deploy(&deploy_hash()).await;

        assert!(matches!(result, Err(EventServiceError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_base_url_keeps_path_prefix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                format!("/events-api/deploy/{}", hash_hex(&deploy_hash())).as_str(),
            )
            .with_status(200)
            .with_body(processed_body(json!({ "Success": {} })))
            .create_async()
            .await;

        let client = EventServiceClient::new(
            &format!("{}/events-api", server.url()),
            Duration::from_secs(5),
        )
        .expect("valid url");
        client
            .get_processed_deploy(&deploy_hash())
            .await
            .expect("should fetch");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_for_processed_returns_terminal_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/deploy/{}", hash_hex(&deploy_hash())).as_str())
            .with_status(200)
            .with_body(processed_body(
                json!({ "Failure": { "error_message": "User error: 2" } }),
            ))
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let processed = client
            .wait_for_processed(&deploy_hash(), fast_polling(Duration::from_secs(5)))
            .await
            .expect("should finish");

        assert_eq!(
            processed.status(),
            ExecutionStatus::Failure {
                message: "User error: 2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_wait_for_processed_unknown_hash() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/deploy/{}", hash_hex(&deploy_hash())).as_str())
            .with_status(404)
            .expect_at_least(1)
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let result = client
            .wait_for_processed(&deploy_hash(), fast_polling(Duration::from_millis(100)))
            .await;

        assert!(matches!(result, Err(EventServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_wait_for_processed_times_out_while_pending() {
        let hash = hash_hex(&deploy_hash());
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", format!("/deploy/{hash}").as_str())
            .with_status(200)
            .with_body(
                json!({ "deploy_hash": hash, "deploy_accepted": {}, "deploy_expired": false })
                    .to_string(),
            )
            .expect_at_least(1)
            .create_async()
            .await;

        let client =
            EventServiceClient::new(&server.url(), Duration::from_secs(5)).expect("valid url");
        let result = client
            .wait_for_processed(&deploy_hash(), fast_polling(Duration::from_millis(100)))
            .await;

        assert!(matches!(result, Err(EventServiceError::TimedOut { .. })));
    }
}
