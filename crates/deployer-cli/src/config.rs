//! Runtime configuration, resolved once at startup.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment variables and flags
//! (the latter two are merged by clap).
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use casper_deployer_sdk::{
    PollConfig, event_service::DEFAULT_WAIT_TIMEOUT, jsonrpc::DEFAULT_REQUEST_TIMEOUT,
};
use clap::ValueEnum;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::GlobalArgs;

pub const DEFAULT_NODE_RPC: &str = "http://127.0.0.1:7777/rpc";
pub const DEFAULT_EVENT_SERVICE: &str = "http://127.0.0.1:9999";
pub const DEFAULT_CHAIN_NAME: &str = "casper-test";
pub const DEFAULT_MODULE_PATH: &str =
    "contract/target/wasm32-unknown-unknown/release/contract.wasm";
pub const DEFAULT_ENTRY_POINT: &str = "get_funds_raised";
pub const DEFAULT_INSTALL_PAYMENT_CSPR: u64 = 35;
pub const DEFAULT_CALL_PAYMENT_CSPR: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing setting `{0}`, pass it as a flag, environment variable or in the config file")]
    Missing(&'static str),
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),
}

/// How the execution result is obtained after submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Poll the event service REST API until the deploy is processed.
    #[default]
    Rest,
    /// Follow the node's SSE stream until the deploy is processed.
    Sse,
    /// Query the event service a single time.
    Once,
}

/// Settings as they appear in the TOML file; everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub node_rpc: Option<String>,
    pub event_service: Option<String>,
    pub sse_url: Option<String>,
    pub secret_key: Option<PathBuf>,
    pub public_key: Option<String>,
    pub chain_name: Option<String>,
    pub module_path: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub install_payment_cspr: Option<u64>,
    pub call_payment_cspr: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub wait: Option<WaitMode>,
    pub wait_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved settings, passed explicitly to every step.
#[derive(Debug, Clone)]
pub struct Config {
    pub node_rpc: String,
    pub event_service: String,
    pub sse_url: Option<String>,
    pub secret_key: Option<PathBuf>,
    pub public_key: Option<String>,
    pub chain_name: String,
    pub module_path: PathBuf,
    pub entry_point: String,
    pub install_payment_cspr: u64,
    pub call_payment_cspr: u64,
    pub request_timeout: Duration,
    pub wait: WaitMode,
    pub wait_timeout: Duration,
}

impl Config {
    pub fn resolve(args: &GlobalArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: &GlobalArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let request_timeout = seconds(
            "request-timeout",
            args.request_timeout.or(file.request_timeout_secs),
            DEFAULT_REQUEST_TIMEOUT,
        )?;
        let wait_timeout = seconds(
            "wait-timeout",
            args.wait_timeout.or(file.wait_timeout_secs),
            DEFAULT_WAIT_TIMEOUT,
        )?;

        let config = Config {
            node_rpc: args
                .node_rpc
                .clone()
                .or(file.node_rpc)
                .unwrap_or_else(|| DEFAULT_NODE_RPC.to_string()),
            event_service: args
                .event_service
                .clone()
                .or(file.event_service)
                .unwrap_or_else(|| DEFAULT_EVENT_SERVICE.to_string()),
            sse_url: args.sse_url.clone().or(file.sse_url),
            secret_key: args.secret_key.clone().or(file.secret_key),
            public_key: args.public_key.clone().or(file.public_key),
            chain_name: args
                .chain_name
                .clone()
                .or(file.chain_name)
                .unwrap_or_else(|| DEFAULT_CHAIN_NAME.to_string()),
            module_path: file
                .module_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODULE_PATH)),
            entry_point: file
                .entry_point
                .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string()),
            install_payment_cspr: file
                .install_payment_cspr
                .unwrap_or(DEFAULT_INSTALL_PAYMENT_CSPR),
            call_payment_cspr: file.call_payment_cspr.unwrap_or(DEFAULT_CALL_PAYMENT_CSPR),
            request_timeout,
            wait: args.wait.or(file.wait).unwrap_or_default(),
            wait_timeout,
        };

        if config.wait == WaitMode::Sse && config.sse_url.is_none() {
            return Err(ConfigError::Missing("sse-url"));
        }
        Ok(config)
    }

    /// Key locations, required only by commands that sign.
    pub fn signing_keys(&self) -> Result<(&Path, &str), ConfigError> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(ConfigError::Missing("secret-key"))?;
        let public_key = self
            .public_key
            .as_deref()
            .ok_or(ConfigError::Missing("public-key"))?;
        Ok((secret_key, public_key))
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: self.wait_timeout,
            ..PollConfig::default()
        }
    }
}

fn seconds(
    name: &'static str,
    value: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Zero(name)),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::merge(&GlobalArgs::default(), FileConfig::default())
            .expect("defaults should resolve");
        assert_eq!(config.node_rpc, DEFAULT_NODE_RPC);
        assert_eq!(config.event_service, DEFAULT_EVENT_SERVICE);
        assert_eq!(config.chain_name, "casper-test");
        assert_eq!(config.install_payment_cspr, 35);
        assert_eq!(config.call_payment_cspr, 1);
        assert_eq!(config.entry_point, "get_funds_raised");
        assert_eq!(config.wait, WaitMode::Rest);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.wait_timeout, DEFAULT_WAIT_TIMEOUT);
    }

    #[test]
    fn test_flags_override_file() {
        let args = GlobalArgs {
            chain_name: Some("casper".to_string()),
            request_timeout: Some(5),
            ..GlobalArgs::default()
        };
        let file = FileConfig {
            chain_name: Some("casper-test".to_string()),
            node_rpc: Some("http://10.0.0.1:7777/rpc".to_string()),
            request_timeout_secs: Some(60),
            ..FileConfig::default()
        };

        let config = Config::merge(&args, file).expect("should resolve");
        assert_eq!(config.chain_name, "casper");
        assert_eq!(config.node_rpc, "http://10.0.0.1:7777/rpc");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_signing_keys_required() {
        let config = Config::merge(&GlobalArgs::default(), FileConfig::default())
            .expect("should resolve");
        assert!(matches!(
            config.signing_keys(),
            Err(ConfigError::Missing("secret-key"))
        ));

        let args = GlobalArgs {
            secret_key: Some(PathBuf::from("secret_key.pem")),
            ..GlobalArgs::default()
        };
        let config = Config::merge(&args, FileConfig::default()).expect("should resolve");
        assert!(matches!(
            config.signing_keys(),
            Err(ConfigError::Missing("public-key"))
        ));
    }

    #[test]
    fn test_sse_wait_requires_url() {
        let args = GlobalArgs {
            wait: Some(WaitMode::Sse),
            ..GlobalArgs::default()
        };
        assert!(matches!(
            Config::merge(&args, FileConfig::default()),
            Err(ConfigError::Missing("sse-url"))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = GlobalArgs {
            wait_timeout: Some(0),
            ..GlobalArgs::default()
        };
        assert!(matches!(
            Config::merge(&args, FileConfig::default()),
            Err(ConfigError::Zero("wait-timeout"))
        ));
    }

    #[test]
    fn test_load_file() {
        let file = tempfile::NamedTempFile::new().expect("should create temp file");
        std::fs::write(
            file.path(),
            r#"
node_rpc = "http://135.181.208.231:7777/rpc"
event_service = "http://135.181.208.231:9999"
secret_key = "../_private/secret_key.pem"
public_key = "01cded33d09474d1c9c9039e8af42b5c8f04e35b47c289f29f89ce3bc8fb03084c"
install_payment_cspr = 40
wait = "once"
"#,
        )
        .expect("should write config");

        let args = GlobalArgs {
            config: Some(file.path().to_path_buf()),
            ..GlobalArgs::default()
        };
        let config = Config::resolve(&args).expect("should resolve");
        assert_eq!(config.event_service, "http://135.181.208.231:9999");
        assert_eq!(config.install_payment_cspr, 40);
        assert_eq!(config.wait, WaitMode::Once);
        let (secret_key, public_key) = config.signing_keys().expect("keys configured");
        assert_eq!(secret_key, Path::new("../_private/secret_key.pem"));
        assert!(public_key.starts_with("01cded33"));
    }

    #[test]
    fn test_load_file_rejects_unknown_keys() {
        let file = tempfile::NamedTempFile::new().expect("should create temp file");
        std::fs::write(file.path(), "node_url = \"http://x\"\n").expect("should write config");

        assert!(matches!(
            FileConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            FileConfig::load(Path::new("/definitely/not/here.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
