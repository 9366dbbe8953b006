//! Deploy construction and signing.
//!
//! A deploy moves through two states: [`UnsignedDeploy`] once parameters, payment and session
//! have been composed, and [`SignedDeploy`] once at least one approval is attached. Only the
//! latter can be handed to [`crate::jsonrpc::CasperClient::put_deploy`].
use std::path::{Path, PathBuf};

use casper_client::cli::{DeployBuilder, DeployBuilderError};
use casper_types::{
    Approval, Deploy, DeployHash, ExecutableDeployItem, PublicKey, RuntimeArgs, TimeDiff,
    Timestamp, U512, bytesrepr::Bytes, contracts::ContractHash, crypto,
};
use thiserror::Error;
use tracing::debug;

use crate::keys::KeyPair;

/// Number of motes in one CSPR.
pub const MOTES_PER_CSPR: u64 = 1_000_000_000;

/// Size of a contract hash in bytes.
pub const CONTRACT_HASH_LENGTH: usize = 32;

/// Time to live applied when none is given explicitly.
pub const DEFAULT_TTL: TimeDiff = TimeDiff::from_millis(30 * 60 * 1_000);

const FORMATTED_HASH_PREFIX: &str = "hash-";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("payment of {cspr} CSPR does not fit in motes")]
    PaymentOverflow { cspr: u64 },
    #[error("failed to read module bytes from {}: {source}", path.display())]
    ModuleFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module bytes are empty")]
    EmptyModule,
    #[error("contract hash is not valid hex: {0}")]
    ContractHashHex(#[from] hex::FromHexError),
    #[error("contract hash must be {CONTRACT_HASH_LENGTH} bytes, got {actual}")]
    ContractHashLength { actual: usize },
    #[error("entry point name is empty")]
    EmptyEntryPoint,
    #[error("deploy dependencies are not supported by the network")]
    DependenciesUnsupported,
    #[error("deploy builder error: {0}")]
    Builder(#[from] DeployBuilderError),
}

#[derive(Error, Debug)]
pub enum SignError {
    #[error("deploy account {account} does not match signing key {signer}")]
    AccountMismatch { account: String, signer: String },
    #[error("approval by {signer} does not verify: {source}")]
    InvalidSignature {
        signer: String,
        #[source]
        source: crypto::Error,
    },
    #[error("deploy carries no approvals")]
    Unsigned,
}

/// Header level parameters of a deploy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployParams {
    account: PublicKey,
    chain_name: String,
    dependencies: Vec<DeployHash>,
    timestamp: Timestamp,
    ttl: TimeDiff,
}

impl DeployParams {
    pub fn new(
        account: PublicKey,
        chain_name: impl Into<String>,
        dependencies: Vec<DeployHash>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            account,
            chain_name: chain_name.into(),
            dependencies,
            timestamp,
            ttl: DEFAULT_TTL,
        }
    }

    /// Parameters timestamped with the current wall-clock time and no dependencies.
    ///
    /// Two calls produce different deploys, which is what the network expects.
    pub fn now(account: PublicKey, chain_name: impl Into<String>) -> Self {
        Self::new(account, chain_name, Vec::new(), Timestamp::now())
    }

    pub fn with_ttl(mut self, ttl: TimeDiff) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn account(&self) -> &PublicKey {
        &self.account
    }

    pub fn chain_name(&self) -> &str {
        &self.chain_name
    }

    pub fn dependencies(&self) -> &[DeployHash] {
        &self.dependencies
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn ttl(&self) -> TimeDiff {
        self.ttl
    }
}

/// Standard payment, in motes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payment {
    amount: U512,
}

impl Payment {
    pub fn from_motes(amount: impl Into<U512>) -> Self {
        Self {
            amount: amount.into(),
        }
    }

    pub fn from_cspr(cspr: u64) -> Result<Self, BuildError> {
        cspr.checked_mul(MOTES_PER_CSPR)
            .map(Self::from_motes)
            .ok_or(BuildError::PaymentOverflow { cspr })
    }

    pub fn amount(&self) -> U512 {
        self.amount
    }

    fn into_executable(self) -> ExecutableDeployItem {
        ExecutableDeployItem::new_standard_payment(self.amount)
    }
}

/// What the deploy executes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Session {
    /// Run (and usually install) a Wasm module.
    Install {
        module_bytes: Bytes,
        args: RuntimeArgs,
    },
    /// Call an entry point of a contract stored under `contract_hash`.
    Invoke {
        contract_hash: ContractHash,
        entry_point: String,
        args: RuntimeArgs,
    },
}

impl Session {
    pub fn install(module_bytes: Vec<u8>, args: RuntimeArgs) -> Result<Self, BuildError> {
        if module_bytes.is_empty() {
            return Err(BuildError::EmptyModule);
        }
        Ok(Session::Install {
            module_bytes: Bytes::from(module_bytes),
            args,
        })
    }

    /// Reads the module from disk. A missing or empty file is an error.
    pub fn install_from_file(
        path: impl AsRef<Path>,
        args: RuntimeArgs,
    ) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let module_bytes = std::fs::read(path).map_err(|source| BuildError::ModuleFile {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), size = module_bytes.len(), "Read module bytes");
        Self::install(module_bytes, args)
    }

    /// Builds an invocation of a stored contract. `contract_hash` must be exactly 32 bytes.
    pub fn invoke(
        contract_hash: &[u8],
        entry_point: impl Into<String>,
        args: RuntimeArgs,
    ) -> Result<Self, BuildError> {
        let hash: [u8; CONTRACT_HASH_LENGTH] = contract_hash
            .try_into()
            .map_err(|_| BuildError::ContractHashLength {
                actual: contract_hash.len(),
            })?;
        let entry_point = entry_point.into();
        if entry_point.is_empty() {
            return Err(BuildError::EmptyEntryPoint);
        }
        Ok(Session::Invoke {
            contract_hash: ContractHash::new(hash),
            entry_point,
            args,
        })
    }

    /// Same as [`Session::invoke`] but takes the hash as hex, optionally in the `hash-...` form.
    pub fn invoke_hex(
        contract_hash_hex: &str,
        entry_point: impl Into<String>,
        args: RuntimeArgs,
    ) -> Result<Self, BuildError> {
        let trimmed = contract_hash_hex.trim();
        let hex_part = trimmed
            .strip_prefix(FORMATTED_HASH_PREFIX)
            .unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)?;
        Self::invoke(&bytes, entry_point, args)
    }

    pub fn entry_point(&self) -> Option<&str> {
        match self {
            Session::Install { .. } => None,
            Session::Invoke { entry_point, .. } => Some(entry_point),
        }
    }

    pub fn args(&self) -> &RuntimeArgs {
        match self {
            Session::Install { args, .. } | Session::Invoke { args, .. } => args,
        }
    }

    fn into_executable(self) -> ExecutableDeployItem {
        match self {
            Session::Install { module_bytes, args } => {
                ExecutableDeployItem::ModuleBytes { module_bytes, args }
            }
            Session::Invoke {
                contract_hash,
                entry_point,
                args,
            } => ExecutableDeployItem::StoredContractByHash {
                hash: contract_hash,
                entry_point,
                args,
            },
        }
    }
}

/// Assembles a deploy that still needs to be signed.
pub fn compose(
    params: DeployParams,
    payment: Payment,
    session: Session,
) -> Result<UnsignedDeploy, BuildError> {
    if !params.dependencies.is_empty() {
        return Err(BuildError::DependenciesUnsupported);
    }

    let deploy = DeployBuilder::new(params.chain_name, session.into_executable())
        .with_account(params.account)
        .with_payment(payment.into_executable())
        .with_timestamp(params.timestamp)
        .with_ttl(params.ttl)
        .build()?;

    debug!(deploy_hash = %hash_hex(deploy.hash()), "Composed deploy");
    Ok(UnsignedDeploy { deploy })
}

/// A fully composed deploy without approvals.
#[derive(Clone, Debug)]
pub struct UnsignedDeploy {
    deploy: Deploy,
}

impl UnsignedDeploy {
    pub fn hash(&self) -> &DeployHash {
        self.deploy.hash()
    }

    pub fn as_deploy(&self) -> &Deploy {
        &self.deploy
    }

    /// Signs with the key of the deploy's account.
    pub fn sign(self, key_pair: &KeyPair) -> Result<SignedDeploy, SignError> {
        let account = self.deploy.header().account();
        if account != key_pair.public_key() {
            return Err(SignError::AccountMismatch {
                account: account.to_account_hash().to_formatted_string(),
                signer: key_pair.public_key().to_account_hash().to_formatted_string(),
            });
        }

        let mut signed = SignedDeploy {
            deploy: self.deploy,
        };
        signed.sign(key_pair)?;
        Ok(signed)
    }
}

/// A deploy carrying at least one approval.
///
/// Not `Clone`: submitting consumes it, so a given value goes to the network at most once.
#[derive(Debug)]
pub struct SignedDeploy {
    deploy: Deploy,
}

impl SignedDeploy {
    /// Adds an approval by `key_pair`. Approving again with the same key leaves the deploy as is.
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), SignError> {
        self.deploy.sign(key_pair.secret_key());
        debug!(
            deploy_hash = %hash_hex(self.deploy.hash()),
            approvals = self.deploy.approvals().len(),
            "Signed deploy"
        );
        self.verify()
    }

    /// Verifies every approval against the deploy hash.
    pub fn verify(&self) -> Result<(), SignError> {
        if self.deploy.approvals().is_empty() {
            return Err(SignError::Unsigned);
        }
        self.deploy.approvals().iter().try_for_each(verify_approval(self.deploy.hash()))
    }

    pub fn hash(&self) -> &DeployHash {
        self.deploy.hash()
    }

    pub fn approvals(&self) -> impl Iterator<Item = &Approval> {
        self.deploy.approvals().iter()
    }

    pub fn as_deploy(&self) -> &Deploy {
        &self.deploy
    }

    pub fn into_deploy(self) -> Deploy {
        self.deploy
    }
}

fn verify_approval(deploy_hash: &DeployHash) -> impl Fn(&Approval) -> Result<(), SignError> + '_ {
    move |approval| {
        crypto::verify(deploy_hash.inner(), approval.signature(), approval.signer()).map_err(
            |source| SignError::InvalidSignature {
                signer: approval.signer().to_account_hash().to_formatted_string(),
                source,
            },
        )
    }
}

/// Lowercase hex of a deploy hash, as used in URLs and logs.
pub fn hash_hex(deploy_hash: &DeployHash) -> String {
    hex::encode(deploy_hash.inner())
}
