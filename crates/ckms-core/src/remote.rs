//! Remote KMS providers.
//!
//! The network layer is injected as a [`KmsTransport`]; this module adds the
//! per-call timeout, `kid` derivation and local public-key shortcuts on top.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ckms_crypto::PublicKey;
use zeroize::Zeroizing;

use crate::algorithm::{Algorithm, KeyType};
use crate::cek::{CipherText, WrappedKey};
use crate::config::KeySource;
use crate::error::{KeyError, Result};
use crate::kid::{public_key_kid, remote_secret_kid};
use crate::local::perform_local;
use crate::provider::{KeyHandle, KeyProvider, LoadedKey, Operation, Outcome};
use crate::spec::KeySpecification;

/// Per-call timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a KMS reports about a key.
#[derive(Debug, Clone, Default)]
pub struct RemoteKey {
    /// Public half of an asymmetric key; `None` for symmetric keys.
    pub public_key: Option<PublicKey>,
}

/// User-implemented network layer for a KMS.
///
/// Implementations talk to the service (HTTP, gRPC, a local HSM daemon)
/// and report failures as [`TransportError`]. Retries are the
/// implementation's concern.
#[async_trait]
pub trait KmsTransport: Send + Sync {
    async fn describe(&self, key_ref: &str) -> std::result::Result<RemoteKey, TransportError>;

    async fn sign(
        &self,
        key_ref: &str,
        algorithm: Algorithm,
        message: &[u8],
    ) -> std::result::Result<Vec<u8>, TransportError>;

    async fn verify(
        &self,
        key_ref: &str,
        algorithm: Algorithm,
        message: &[u8],
        signature: &[u8],
    ) -> std::result::Result<bool, TransportError>;

    /// Encrypt with provider-managed IV and tag. The returned blob is opaque.
    async fn encrypt(
        &self,
        key_ref: &str,
        algorithm: Algorithm,
        plaintext: &[u8],
        aad: &[u8],
    ) -> std::result::Result<Vec<u8>, TransportError>;

    async fn decrypt(
        &self,
        key_ref: &str,
        algorithm: Algorithm,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> std::result::Result<Vec<u8>, TransportError>;
}

/// Transport-level error (wraps arbitrary error strings from the transport layer).
#[derive(Debug, Clone)]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// A named KMS backed by a [`KmsTransport`].
#[derive(Clone)]
pub struct RemoteProvider {
    name: String,
    transport: Arc<dyn KmsTransport>,
    timeout: Duration,
}

impl RemoteProvider {
    pub fn new(name: impl Into<String>, transport: Arc<dyn KmsTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        key_ref: &str,
        request: impl Future<Output = std::result::Result<T, TransportError>>,
    ) -> Result<T> {
        tracing::debug!(provider = %self.name, operation, key_ref, "KMS call");
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|err| {
                tracing::warn!(provider = %self.name, operation, key_ref, error = %err, "KMS call failed");
                KeyError::Transport(err)
            }),
            Err(_) => {
                tracing::warn!(
                    provider = %self.name,
                    operation,
                    key_ref,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "KMS call timed out"
                );
                Err(KeyError::Timeout(self.timeout))
            }
        }
    }
}

impl fmt::Debug for RemoteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProvider")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl KeyProvider for RemoteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, spec: &KeySpecification) -> Result<LoadedKey> {
        let KeySource::Kms(key_ref) = spec.source() else {
            return Err(KeyError::InvalidSpec(format!(
                "provider {} requires a kms key reference",
                self.name
            )));
        };
        let remote = self
            .call("describe", key_ref, self.transport.describe(key_ref))
            .await?;

        let kid = match (&remote.public_key, spec.kty()) {
            (None, KeyType::Oct) => remote_secret_kid(&self.name, key_ref),
            (Some(public), kty) if !kty.is_symmetric() => {
                let expected = spec.algorithm().key_family();
                if Some(public.family()) != expected {
                    return Err(KeyError::InvalidSpec(format!(
                        "KMS key {} is {:?}, {} expects {:?}",
                        key_ref,
                        public.family(),
                        spec.algorithm(),
                        expected
                    )));
                }
                public_key_kid(public)
            }
            (_, kty) => {
                return Err(KeyError::InvalidSpec(format!(
                    "KMS key {} does not match key type {}",
                    key_ref, kty
                )))
            }
        };

        Ok(LoadedKey::new(
            kid,
            KeyHandle::Remote {
                key_ref: key_ref.clone(),
                public: remote.public_key,
            },
        ))
    }

    async fn perform(
        &self,
        spec: &KeySpecification,
        key: &KeyHandle,
        operation: Operation<'_>,
    ) -> Result<Outcome> {
        let KeyHandle::Remote { key_ref, public } = key else {
            return Err(KeyError::Unsupported(format!(
                "provider {} only handles remote keys",
                self.name
            )));
        };
        let alg = spec.algorithm();

        // Public-key operations never need the KMS.
        if let Some(public) = public {
            let local = KeyHandle::Public(public.clone());
            match operation {
                Operation::Verify { .. } | Operation::Wrap { .. } => {
                    return perform_local(alg, &local, operation)
                }
                Operation::Encrypt { .. } if alg == Algorithm::RsaOaep256 => {
                    return perform_local(alg, &local, operation)
                }
                _ => {}
            }
        }

        match operation {
            Operation::Sign { message } => self
                .call("sign", key_ref, self.transport.sign(key_ref, alg, message))
                .await
                .map(Outcome::Signature),
            Operation::Verify { message, signature } => self
                .call(
                    "verify",
                    key_ref,
                    self.transport.verify(key_ref, alg, message, signature),
                )
                .await
                .map(Outcome::Verified),
            Operation::Encrypt { plaintext, aad } => {
                let blob = self
                    .call(
                        "encrypt",
                        key_ref,
                        self.transport.encrypt(key_ref, alg, plaintext, aad),
                    )
                    .await?;
                Ok(Outcome::Encrypted(CipherText::Opaque { blob }))
            }
            Operation::Decrypt { ciphertext, aad } => {
                let CipherText::Opaque { blob } = ciphertext else {
                    return Err(KeyError::Unsupported(
                        "remote keys only decrypt provider-managed ciphertext".into(),
                    ));
                };
                let plaintext = self
                    .call(
                        "decrypt",
                        key_ref,
                        self.transport.decrypt(key_ref, alg, blob, aad),
                    )
                    .await?;
                Ok(Outcome::Decrypted(Zeroizing::new(plaintext)))
            }
            Operation::Wrap { key } => {
                let encrypted_key = self
                    .call("encrypt", key_ref, self.transport.encrypt(key_ref, alg, key, &[]))
                    .await?;
                Ok(Outcome::Wrapped(WrappedKey::new(encrypted_key)))
            }
            Operation::Unwrap { wrapped } => {
                if wrapped.epk.is_some() {
                    return Err(KeyError::Unsupported(
                        "key agreement is not available for remote keys".into(),
                    ));
                }
                let key = self
                    .call(
                        "decrypt",
                        key_ref,
                        self.transport
                            .decrypt(key_ref, alg, &wrapped.encrypted_key, &[]),
                    )
                    .await?;
                Ok(Outcome::Unwrapped(Zeroizing::new(key)))
            }
        }
    }
}
