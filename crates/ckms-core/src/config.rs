//! Declarative key specification input.
//!
//! ```json
//! {
//!   "provider": "local",
//!   "kty": "EC",
//!   "use": "sig",
//!   "crv": "P-256",
//!   "key": { "path": "/etc/keys/signing.pem" },
//!   "tags": ["primary"]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::algorithm::{KeyOperation, KeyType, KeyUse};

pub const LOCAL_PROVIDER: &str = "local";

fn default_provider() -> String {
    LOCAL_PROVIDER.to_string()
}

/// Where a provider finds the key material.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// No material configured: the provider generates a fresh key.
    #[default]
    #[serde(skip)]
    Generate,
    /// PEM file on disk.
    Path(PathBuf),
    /// Inline PEM.
    Pem(String),
    /// Inline Base64URL symmetric secret.
    Secret(String),
    /// Key reference inside a remote KMS.
    Kms(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySpecConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub kty: Option<KeyType>,
    #[serde(default, alias = "alg")]
    pub algorithm: Option<String>,
    #[serde(default, rename = "use")]
    pub key_use: Option<KeyUse>,
    #[serde(default, alias = "crv")]
    pub curve: Option<String>,
    #[serde(default)]
    pub key: KeySource,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Pins the key identifier instead of deriving it from the material.
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default, alias = "key_ops")]
    pub ops: Option<BTreeSet<KeyOperation>>,
    /// RSA modulus bits, or symmetric secret bytes, for generated keys.
    #[serde(default)]
    pub size: Option<usize>,
    /// PEM certificate chain published alongside the key.
    #[serde(default)]
    pub certificate: Option<String>,
}
