//! The provider seam: resolves key material and performs operations on it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ckms_crypto::{PrivateKey, PublicKey};
use zeroize::Zeroizing;

use crate::algorithm::KeyOperation;
use crate::cek::{CipherText, WrappedKey};
use crate::config::LOCAL_PROVIDER;
use crate::error::{KeyError, Result};
use crate::local::LocalProvider;
use crate::spec::KeySpecification;

/// Resolved key material.
pub enum KeyHandle {
    Private(PrivateKey),
    Public(PublicKey),
    Secret(Zeroizing<Vec<u8>>),
    /// Material held by a remote KMS; the public half is cached when the
    /// key is asymmetric.
    Remote {
        key_ref: String,
        public: Option<PublicKey>,
    },
}

impl KeyHandle {
    pub fn public_key(&self) -> Option<PublicKey> {
        match self {
            Self::Private(key) => Some(key.public_key()),
            Self::Public(key) => Some(key.clone()),
            Self::Secret(_) => None,
            Self::Remote { public, .. } => public.clone(),
        }
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        match self {
            Self::Private(key) => Some(key),
            _ => None,
        }
    }

    pub fn secret(&self) -> Option<&[u8]> {
        match self {
            Self::Secret(secret) => Some(secret.as_slice()),
            _ => None,
        }
    }

    /// Handle exposing only the public half. `None` for symmetric material.
    pub fn as_public(&self) -> Option<Self> {
        match self {
            Self::Private(key) => Some(Self::Public(key.public_key())),
            Self::Public(key) => Some(Self::Public(key.clone())),
            Self::Secret(_) => None,
            Self::Remote { key_ref, public } => public.as_ref().map(|public| Self::Remote {
                key_ref: key_ref.clone(),
                public: Some(public.clone()),
            }),
        }
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private(key) => f.debug_tuple("Private").field(&key.family()).finish(),
            Self::Public(key) => f.debug_tuple("Public").field(&key.family()).finish(),
            Self::Secret(secret) => write!(f, "Secret({} bytes)", secret.len()),
            Self::Remote { key_ref, .. } => f.debug_struct("Remote").field("key_ref", key_ref).finish(),
        }
    }
}

/// A loaded key: its identifier and shared material.
#[derive(Debug, Clone)]
pub struct LoadedKey {
    pub kid: String,
    pub handle: Arc<KeyHandle>,
}

impl LoadedKey {
    pub fn new(kid: impl Into<String>, handle: KeyHandle) -> Self {
        Self {
            kid: kid.into(),
            handle: Arc::new(handle),
        }
    }
}

/// One cryptographic operation, dispatched to a provider.
#[derive(Clone, Copy)]
pub enum Operation<'a> {
    Sign {
        message: &'a [u8],
    },
    Verify {
        message: &'a [u8],
        signature: &'a [u8],
    },
    Encrypt {
        plaintext: &'a [u8],
        aad: &'a [u8],
    },
    Decrypt {
        ciphertext: &'a CipherText,
        aad: &'a [u8],
    },
    Wrap {
        key: &'a [u8],
    },
    Unwrap {
        wrapped: &'a WrappedKey,
    },
}

impl Operation<'_> {
    pub fn kind(&self) -> KeyOperation {
        match self {
            Self::Sign { .. } => KeyOperation::Sign,
            Self::Verify { .. } => KeyOperation::Verify,
            Self::Encrypt { .. } => KeyOperation::Encrypt,
            Self::Decrypt { .. } => KeyOperation::Decrypt,
            Self::Wrap { .. } => KeyOperation::WrapKey,
            Self::Unwrap { .. } => KeyOperation::UnwrapKey,
        }
    }
}

/// Result of an [`Operation`], one variant per operation kind.
pub enum Outcome {
    Signature(Vec<u8>),
    Verified(bool),
    Encrypted(CipherText),
    Decrypted(Zeroizing<Vec<u8>>),
    Wrapped(WrappedKey),
    Unwrapped(Zeroizing<Vec<u8>>),
}

impl Outcome {
    pub fn kind(&self) -> KeyOperation {
        match self {
            Self::Signature(_) => KeyOperation::Sign,
            Self::Verified(_) => KeyOperation::Verify,
            Self::Encrypted(_) => KeyOperation::Encrypt,
            Self::Decrypted(_) => KeyOperation::Decrypt,
            Self::Wrapped(_) => KeyOperation::WrapKey,
            Self::Unwrapped(_) => KeyOperation::UnwrapKey,
        }
    }
}

/// Backend that resolves key material and performs operations with it.
///
/// Implementations must be stateless with respect to individual keys: all
/// per-key state lives in the [`KeyHandle`] returned by `load`.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Registry name referenced by the `provider` configuration field.
    fn name(&self) -> &str;

    /// Resolve the key material described by `spec` and derive its `kid`.
    async fn load(&self, spec: &KeySpecification) -> Result<LoadedKey>;

    /// Perform `operation` with loaded material. Permission checks have
    /// already happened.
    async fn perform(
        &self,
        spec: &KeySpecification,
        key: &KeyHandle,
        operation: Operation<'_>,
    ) -> Result<Outcome>;
}

/// Providers by name. `"local"` is always registered.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn KeyProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let mut providers: HashMap<String, Arc<dyn KeyProvider>> = HashMap::new();
        providers.insert(LOCAL_PROVIDER.to_string(), Arc::new(LocalProvider));
        Self { providers }
    }

    /// Register a provider, replacing any provider with the same name.
    pub fn register(&mut self, provider: Arc<dyn KeyProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn KeyProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn KeyProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| KeyError::UnknownProvider(name.to_string()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderRegistry")
            .field("providers", &names)
            .finish()
    }
}
