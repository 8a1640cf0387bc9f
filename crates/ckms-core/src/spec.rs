//! Key specifications: what a key is, what it may do, and how to reach it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use ckms_crypto::Curve;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::algorithm::{public_operations, Algorithm, KeyOperation, KeyType, KeyUse};
use crate::cek::{CipherText, WrappedKey};
use crate::config::{KeySource, KeySpecConfig};
use crate::error::{KeyError, Result};
use crate::local::LocalProvider;
use crate::provider::{KeyHandle, KeyProvider, LoadedKey, Operation, Outcome, ProviderRegistry};

/// One cryptographic key.
///
/// A specification starts unloaded; [`load`](Self::load) resolves its
/// material through the configured provider and fixes its `kid`. Loaded
/// material is shared, so clones are cheap and always agree on the key.
#[derive(Clone)]
pub struct KeySpecification {
    kty: KeyType,
    algorithm: Algorithm,
    key_use: KeyUse,
    curve: Option<Curve>,
    operations: BTreeSet<KeyOperation>,
    tags: BTreeSet<String>,
    source: KeySource,
    size: Option<usize>,
    pinned_kid: Option<String>,
    certificate: Option<String>,
    provider: Arc<dyn KeyProvider>,
    loaded: Option<LoadedKey>,
    public: bool,
    unchecked: bool,
}

impl KeySpecification {
    /// Parse the declarative form, e.g.
    /// `{"kty": "oct", "alg": "HS256", "kid": "k1", "key": {"secret": "..."}}`.
    pub fn parse(value: &Value, providers: &ProviderRegistry) -> Result<Self> {
        let config: KeySpecConfig = serde_json::from_value(value.clone())
            .map_err(|e| KeyError::InvalidSpec(e.to_string()))?;
        Self::from_config(config, providers)
    }

    pub fn from_config(config: KeySpecConfig, providers: &ProviderRegistry) -> Result<Self> {
        let provider = providers.get(&config.provider)?;

        let curve = config
            .curve
            .as_deref()
            .map(|name| {
                Curve::from_name(name)
                    .ok_or_else(|| KeyError::InvalidSpec(format!("unknown curve {}", name)))
            })
            .transpose()?;

        let algorithm = match config.algorithm.as_deref() {
            Some(name) => Algorithm::from_name(name)?,
            None => {
                let kty = config.kty.ok_or_else(|| {
                    KeyError::InvalidSpec("either kty or algorithm is required".into())
                })?;
                Algorithm::default_for(kty, config.key_use.unwrap_or(KeyUse::Sig), curve)?
            }
        };

        if let Some(kty) = config.kty {
            if kty != algorithm.key_type() {
                return Err(KeyError::InvalidSpec(format!(
                    "{} requires kty {}, got {}",
                    algorithm,
                    algorithm.key_type(),
                    kty
                )));
            }
        }
        if let Some(key_use) = config.key_use {
            if key_use != algorithm.key_use() {
                return Err(KeyError::InvalidSpec(format!(
                    "{} is a {} algorithm, got use {}",
                    algorithm,
                    algorithm.key_use(),
                    key_use
                )));
            }
        }
        match (curve, algorithm.curve()) {
            (Some(curve), Some(expected)) if curve != expected => {
                return Err(KeyError::InvalidSpec(format!(
                    "{} requires curve {}, got {}",
                    algorithm,
                    expected.name(),
                    curve.name()
                )))
            }
            (Some(curve), None) => {
                return Err(KeyError::InvalidSpec(format!(
                    "{} does not take a curve, got {}",
                    algorithm,
                    curve.name()
                )))
            }
            _ => {}
        }

        let operations = match config.ops {
            Some(ops) => {
                let supported = algorithm.supported_operations();
                if let Some(op) = ops.iter().find(|op| !supported.contains(*op)) {
                    return Err(KeyError::InvalidSpec(format!(
                        "{} keys cannot {}",
                        algorithm, op
                    )));
                }
                ops
            }
            None => algorithm.default_operations(),
        };

        Ok(Self {
            kty: algorithm.key_type(),
            algorithm,
            key_use: algorithm.key_use(),
            curve: algorithm.curve(),
            operations,
            tags: config.tags,
            source: config.key,
            size: config.size,
            pinned_kid: config.kid,
            certificate: config.certificate,
            provider,
            loaded: None,
            public: false,
            unchecked: false,
        })
    }

    /// A locally generated key for `algorithm` with default operations.
    pub fn generate(algorithm: Algorithm) -> Self {
        Self {
            kty: algorithm.key_type(),
            algorithm,
            key_use: algorithm.key_use(),
            curve: algorithm.curve(),
            operations: algorithm.default_operations(),
            tags: BTreeSet::new(),
            source: KeySource::Generate,
            size: None,
            pinned_kid: None,
            certificate: None,
            provider: Arc::new(LocalProvider),
            loaded: None,
            public: false,
            unchecked: false,
        }
    }

    /// Pin the key identifier instead of deriving it at load time.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        if self.loaded.is_none() {
            self.pinned_kid = Some(kid.into());
        }
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Generated RSA modulus bits or symmetric key bytes.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Skip operation permission checks. Test fixtures only.
    pub fn unchecked(mut self) -> Self {
        self.unchecked = true;
        self
    }

    /// Resolve key material and derive the `kid`. Does nothing once loaded.
    pub async fn load(&mut self) -> Result<()> {
        if self.loaded.is_some() {
            return Ok(());
        }
        let mut loaded = self.provider.load(self).await?;
        if let Some(kid) = &self.pinned_kid {
            loaded.kid = kid.clone();
        }
        if matches!(*loaded.handle, KeyHandle::Public(_)) {
            self.public = true;
            self.operations = public_operations(&self.operations);
        }
        tracing::debug!(
            provider = self.provider.name(),
            alg = %self.algorithm,
            kid = %loaded.kid,
            "key loaded"
        );
        self.loaded = Some(loaded);
        Ok(())
    }

    /// [`load`](Self::load) for builder chains.
    pub async fn into_loaded(mut self) -> Result<Self> {
        self.load().await?;
        Ok(self)
    }

    pub fn kty(&self) -> KeyType {
        self.kty
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn key_use(&self) -> KeyUse {
        self.key_use
    }

    pub fn curve(&self) -> Option<Curve> {
        self.curve
    }

    /// `None` until loaded.
    pub fn kid(&self) -> Option<&str> {
        self.loaded.as_ref().map(|loaded| loaded.kid.as_str())
    }

    pub fn operations(&self) -> &BTreeSet<KeyOperation> {
        &self.operations
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn certificate(&self) -> Option<&str> {
        self.certificate.as_deref()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn is_symmetric(&self) -> bool {
        self.kty.is_symmetric()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Whether `op` is allowed. A private asymmetric key also answers for
    /// the operations of its public projection.
    pub fn can_perform(&self, op: KeyOperation) -> bool {
        if self.operations.contains(&op) {
            return true;
        }
        !self.is_symmetric() && !self.public && public_operations(&self.operations).contains(&op)
    }

    pub fn can_sign(&self) -> bool {
        self.can_perform(KeyOperation::Sign)
    }

    pub fn can_verify(&self) -> bool {
        self.can_perform(KeyOperation::Verify)
    }

    pub fn can_encrypt(&self) -> bool {
        self.can_perform(KeyOperation::Encrypt)
    }

    pub fn can_decrypt(&self) -> bool {
        self.can_perform(KeyOperation::Decrypt)
    }

    pub fn can_wrap(&self) -> bool {
        self.can_perform(KeyOperation::WrapKey)
    }

    pub fn can_unwrap(&self) -> bool {
        self.can_perform(KeyOperation::UnwrapKey)
    }

    /// Read-only projection holding only the public half, with the same
    /// `kid`.
    pub fn as_public(&self) -> Result<Self> {
        let loaded = self.loaded.as_ref().ok_or(KeyError::NotLoaded)?;
        if self.is_symmetric() {
            return Err(KeyError::NoPublicProjection);
        }
        let handle = loaded
            .handle
            .as_public()
            .ok_or(KeyError::NoPublicProjection)?;
        Ok(Self {
            operations: public_operations(&self.operations),
            loaded: Some(LoadedKey {
                kid: loaded.kid.clone(),
                handle: Arc::new(handle),
            }),
            public: true,
            ..self.clone()
        })
    }

    /// RFC 7517 public JWK including `kid`, `alg`, `use` and `key_ops`.
    pub fn public_jwk(&self) -> Result<Value> {
        let loaded = self.loaded.as_ref().ok_or(KeyError::NotLoaded)?;
        let public = loaded
            .handle
            .public_key()
            .ok_or(KeyError::NoPublicProjection)?;
        let mut jwk = public.to_jwk();
        if let Value::Object(members) = &mut jwk {
            members.insert("kid".into(), Value::String(loaded.kid.clone()));
            members.insert("alg".into(), Value::String(self.algorithm.name().into()));
            members.insert("use".into(), Value::String(self.key_use.name().into()));
            let ops = public_operations(&self.operations)
                .into_iter()
                .map(|op| Value::String(op.name().into()))
                .collect();
            members.insert("key_ops".into(), Value::Array(ops));
        }
        Ok(jwk)
    }

    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match self.dispatch(Operation::Sign { message }).await? {
            Outcome::Signature(signature) => Ok(signature),
            other => Err(mismatch(KeyOperation::Sign, &other)),
        }
    }

    pub async fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        match self
            .dispatch(Operation::Verify { message, signature })
            .await?
        {
            Outcome::Verified(valid) => Ok(valid),
            other => Err(mismatch(KeyOperation::Verify, &other)),
        }
    }

    pub async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<CipherText> {
        match self.dispatch(Operation::Encrypt { plaintext, aad }).await? {
            Outcome::Encrypted(ciphertext) => Ok(ciphertext),
            other => Err(mismatch(KeyOperation::Encrypt, &other)),
        }
    }

    pub async fn decrypt(&self, ciphertext: &CipherText, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self.dispatch(Operation::Decrypt { ciphertext, aad }).await? {
            Outcome::Decrypted(plaintext) => Ok(plaintext),
            other => Err(mismatch(KeyOperation::Decrypt, &other)),
        }
    }

    pub async fn wrap(&self, key: &[u8]) -> Result<WrappedKey> {
        match self.dispatch(Operation::Wrap { key }).await? {
            Outcome::Wrapped(wrapped) => Ok(wrapped),
            other => Err(mismatch(KeyOperation::WrapKey, &other)),
        }
    }

    pub async fn unwrap(&self, wrapped: &WrappedKey) -> Result<Zeroizing<Vec<u8>>> {
        match self.dispatch(Operation::Unwrap { wrapped }).await? {
            Outcome::Unwrapped(key) => Ok(key),
            other => Err(mismatch(KeyOperation::UnwrapKey, &other)),
        }
    }

    async fn dispatch(&self, operation: Operation<'_>) -> Result<Outcome> {
        let handle = self.authorize(operation.kind())?;
        self.provider.perform(self, handle, operation).await
    }

    fn authorize(&self, op: KeyOperation) -> Result<&KeyHandle> {
        if !self.unchecked && !self.can_perform(op) {
            return Err(KeyError::ForbiddenOperation {
                operation: op,
                kid: self.kid().unwrap_or("<unloaded>").to_string(),
            });
        }
        let loaded = self.loaded.as_ref().ok_or(KeyError::NotLoaded)?;
        Ok(&loaded.handle)
    }
}

fn mismatch(expected: KeyOperation, outcome: &Outcome) -> KeyError {
    KeyError::Unsupported(format!(
        "provider answered {} with a {} result",
        expected,
        outcome.kind()
    ))
}

impl fmt::Debug for KeySpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySpecification")
            .field("kty", &self.kty)
            .field("alg", &self.algorithm)
            .field("kid", &self.kid())
            .field("provider", &self.provider.name())
            .field("public", &self.public)
            .finish()
    }
}
