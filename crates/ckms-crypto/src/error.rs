use thiserror::Error;

/// Failures from the primitive layer. Messages never include key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key must be {expected} bytes, found {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("iv must be {expected} bytes, found {got}")]
    InvalidIvLength { expected: usize, got: usize },

    #[error("tag must be {expected} bytes, found {got}")]
    InvalidTagLength { expected: usize, got: usize },

    #[error("encrypt: {0}")]
    EncryptionFailed(String),

    /// AEAD authentication or RSA-OAEP padding failure.
    #[error("decrypt: {0}")]
    DecryptionFailed(String),

    #[error("key wrap: {0}")]
    WrapFailed(String),

    #[error("key unwrap: {0}")]
    UnwrapFailed(String),

    #[error("sign: {0}")]
    SigningFailed(String),

    #[error("key generation: {0}")]
    KeyGeneration(String),

    /// The key family cannot be used with the requested scheme.
    #[error("wrong key for operation: {0}")]
    KeyMismatch(String),

    #[error("jwk has no {0} member")]
    MissingJwkField(&'static str),

    #[error("jwk: {0}")]
    InvalidJwk(String),

    #[error("pem: {0}")]
    InvalidPem(String),

    #[error("base64url: {0}")]
    Base64Decode(String),

    #[error("number cannot be encoded as canonical json")]
    NonFiniteNumber,

    #[error("os random source: {0}")]
    RngFailed(String),
}
