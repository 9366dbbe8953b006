//! Loading of the account key pair used to sign deploys.
use std::{
    fmt,
    path::{Path, PathBuf},
};

use casper_types::{
    AsymmetricType, PublicKey, SecretKey,
    crypto::{self, ErrorExt},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("failed to read secret key file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("public key is not valid hex: {0}")]
    Decode(#[from] hex::FromHexError),
    #[error("failed to parse secret key: {0}")]
    SecretKey(#[from] ErrorExt),
    #[error("failed to parse public key: {0}")]
    PublicKey(#[from] crypto::Error),
    #[error("public key of {supplied} does not belong to the secret key of {derived}")]
    Mismatch { supplied: String, derived: String },
}

/// Public and secret key of the signing account.
///
/// The pair is immutable once loaded and the secret half never shows up in `Debug` output.
pub struct KeyPair {
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    /// Reads a PEM encoded secret key from `secret_key_path` and pairs it with the hex encoded
    /// public key.
    ///
    /// The public key must be in the tagged Casper form (`01` for Ed25519, `02` for secp256k1,
    /// followed by the raw key bytes) and must match the secret key.
    pub fn load(
        secret_key_path: impl AsRef<Path>,
        public_key_hex: &str,
    ) -> Result<Self, KeyError> {
        let path = secret_key_path.as_ref();
        let pem = std::fs::read(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let secret_key = SecretKey::from_pem(pem)?;
        let public_key = parse_public_key(public_key_hex)?;
        Self::new(public_key, secret_key)
    }

    /// Pairs already parsed keys, checking that they belong together.
    pub fn new(public_key: PublicKey, secret_key: SecretKey) -> Result<Self, KeyError> {
        let derived = PublicKey::from(&secret_key);
        if derived != public_key {
            return Err(KeyError::Mismatch {
                supplied: public_key.to_account_hash().to_formatted_string(),
                derived: derived.to_account_hash().to_formatted_string(),
            });
        }
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Parses a tagged, hex encoded public key.
///
/// Hex decoding is done separately so that malformed input is reported as such rather than as
/// an invalid key.
pub fn parse_public_key(public_key_hex: &str) -> Result<PublicKey, KeyError> {
    let trimmed = public_key_hex.trim();
    hex::decode(trimmed)?;
    Ok(PublicKey::from_hex(trimmed)?)
}
