use std::time::Duration;

use ckms_crypto::CryptoError;
use thiserror::Error;

use crate::algorithm::KeyOperation;
use crate::remote::TransportError;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("operation {operation} is not permitted for key {kid}")]
    ForbiddenOperation { operation: KeyOperation, kid: String },

    #[error("specification is not loaded")]
    NotLoaded,

    #[error("invalid key specification: {0}")]
    InvalidSpec(String),

    #[error("unknown key provider: {0}")]
    UnknownProvider(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("symmetric keys have no public projection")]
    NoPublicProjection,

    #[error("unsupported by key material: {0}")]
    Unsupported(String),

    #[error("remote KMS call timed out after {0:?}")]
    Timeout(Duration),

    #[error("KMS transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to read key material: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KeyError>;
