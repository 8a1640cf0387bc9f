use ckms_core::KeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JoseError {
    #[error("malformed JOSE object: {0}")]
    MalformedObject(String),

    #[error("malformed JOSE header: {0}")]
    MalformedHeader(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing protected claim: {0}")]
    MissingProtectedClaim(&'static str),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("payload could not be decrypted: {0}")]
    Undecryptable(String),

    #[error("signatures must be added before any recipient")]
    SignAfterEncrypt,

    #[error("cannot serialize: {0}")]
    Serialization(String),

    #[error("direct encryption allows exactly one recipient")]
    DirectRecipient,

    #[error("key {0} cannot encrypt for a recipient")]
    CannotEncrypt(String),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JoseError>;

/// Failures of the cryptography itself become `Undecryptable`; everything
/// else (permissions, transport) keeps its own variant.
pub(crate) fn undecryptable(err: KeyError) -> JoseError {
    match err {
        KeyError::Crypto(err) => JoseError::Undecryptable(err.to_string()),
        other => JoseError::Key(other),
    }
}

/// Content decryption: a ciphertext the key cannot open, such as an
/// opaque blob handed to a local key, counts as undecryptable.
pub(crate) fn content_undecryptable(err: KeyError) -> JoseError {
    match err {
        KeyError::Unsupported(reason) => JoseError::Undecryptable(reason),
        other => undecryptable(other),
    }
}
