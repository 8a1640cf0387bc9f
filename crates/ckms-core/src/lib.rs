pub mod algorithm;
pub mod cek;
pub mod config;
pub mod error;
pub mod keychain;
pub mod kid;
pub mod local;
pub mod provider;
pub mod remote;
pub mod spec;

pub use algorithm::{Algorithm, KeyOperation, KeyType, KeyUse};
pub use cek::{CipherText, ContentEncryptionKey, WrappedKey};
pub use config::{KeySource, KeySpecConfig, LOCAL_PROVIDER};
pub use error::{KeyError, Result};
pub use keychain::Keychain;
pub use kid::{public_key_kid, remote_secret_kid, secret_kid};
pub use local::LocalProvider;
pub use provider::{KeyHandle, KeyProvider, LoadedKey, Operation, Outcome, ProviderRegistry};
pub use remote::{KmsTransport, RemoteKey, RemoteProvider, TransportError, DEFAULT_TIMEOUT};
pub use spec::KeySpecification;
