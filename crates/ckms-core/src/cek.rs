//! Content encryption keys and the values they produce.

use std::fmt;

use ckms_crypto::{ContentCipher, PublicKey, Sealed};
use zeroize::Zeroizing;

use crate::algorithm::Algorithm;
use crate::error::{KeyError, Result};
use crate::spec::KeySpecification;

/// Output of a content encryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherText {
    /// AEAD output with its IV and authentication tag.
    Aead {
        ciphertext: Vec<u8>,
        iv: Vec<u8>,
        tag: Vec<u8>,
    },
    /// Provider-managed ciphertext (remote KMS or HSM) that embeds its own
    /// IV and tag. Only the producing provider can decrypt it.
    Opaque { blob: Vec<u8> },
}

impl CipherText {
    /// Rebuild from JWE segments. Empty `iv` and `tag` mark an opaque blob.
    pub fn from_parts(ciphertext: Vec<u8>, iv: Vec<u8>, tag: Vec<u8>) -> Self {
        if iv.is_empty() && tag.is_empty() {
            Self::Opaque { blob: ciphertext }
        } else {
            Self::Aead { ciphertext, iv, tag }
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        match self {
            Self::Aead { ciphertext, .. } => ciphertext,
            Self::Opaque { blob } => blob,
        }
    }

    pub fn iv(&self) -> &[u8] {
        match self {
            Self::Aead { iv, .. } => iv,
            Self::Opaque { .. } => &[],
        }
    }

    pub fn tag(&self) -> &[u8] {
        match self {
            Self::Aead { tag, .. } => tag,
            Self::Opaque { .. } => &[],
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque { .. })
    }
}

impl From<Sealed> for CipherText {
    fn from(sealed: Sealed) -> Self {
        Self::Aead {
            ciphertext: sealed.ciphertext,
            iv: sealed.iv,
            tag: sealed.tag,
        }
    }
}

/// A CEK encrypted for one recipient, with the header parameters the key
/// management algorithm produced or needs back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrappedKey {
    pub encrypted_key: Vec<u8>,
    /// AES-GCMKW IV.
    pub iv: Option<Vec<u8>>,
    /// AES-GCMKW tag.
    pub tag: Option<Vec<u8>>,
    /// ECDH-ES ephemeral public key.
    pub epk: Option<PublicKey>,
    pub apu: Option<Vec<u8>>,
    pub apv: Option<Vec<u8>>,
}

impl WrappedKey {
    pub fn new(encrypted_key: Vec<u8>) -> Self {
        Self {
            encrypted_key,
            ..Self::default()
        }
    }

    /// Direct mode: nothing is wrapped.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The symmetric key protecting a JWE body.
#[derive(Clone)]
pub enum ContentEncryptionKey {
    /// Random key generated for one message and wrapped for each recipient.
    Ephemeral {
        cipher: ContentCipher,
        key: Zeroizing<Vec<u8>>,
    },
    /// Direct mode: the recipient key is itself the CEK.
    Direct(KeySpecification),
}

impl fmt::Debug for ContentEncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ephemeral { cipher, .. } => f.debug_tuple("Ephemeral").field(cipher).finish(),
            Self::Direct(spec) => f.debug_tuple("Direct").field(spec).finish(),
        }
    }
}

impl ContentEncryptionKey {
    pub fn generate(cipher: ContentCipher) -> Result<Self> {
        Ok(Self::Ephemeral {
            cipher,
            key: cipher.generate_key()?,
        })
    }

    /// Adopt key bytes recovered by unwrapping.
    pub fn from_bytes(cipher: ContentCipher, key: Zeroizing<Vec<u8>>) -> Result<Self> {
        if key.len() != cipher.key_len() {
            return Err(KeyError::Crypto(ckms_crypto::CryptoError::InvalidKeyLength {
                expected: cipher.key_len(),
                got: key.len(),
            }));
        }
        Ok(Self::Ephemeral { cipher, key })
    }

    /// Use a symmetric content encryption key specification directly.
    pub fn direct(spec: KeySpecification) -> Result<Self> {
        if !spec.algorithm().is_content_encryption() {
            return Err(KeyError::InvalidSpec(format!(
                "{} cannot be used for direct encryption",
                spec.algorithm()
            )));
        }
        Ok(Self::Direct(spec))
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct(_))
    }

    /// The `enc` algorithm this key encrypts with.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ephemeral { cipher, .. } => match cipher {
                ContentCipher::A128Gcm => Algorithm::A128Gcm,
                ContentCipher::A192Gcm => Algorithm::A192Gcm,
                ContentCipher::A256Gcm => Algorithm::A256Gcm,
            },
            Self::Direct(spec) => spec.algorithm(),
        }
    }

    /// Encrypt under a fresh IV.
    pub async fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<CipherText> {
        match self {
            Self::Ephemeral { cipher, key } => Ok(cipher.seal(key, plaintext, aad)?.into()),
            Self::Direct(spec) => spec.encrypt(plaintext, aad).await,
        }
    }

    pub async fn decrypt(&self, ciphertext: &CipherText, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match (self, ciphertext) {
            (
                Self::Ephemeral { cipher, key },
                CipherText::Aead {
                    ciphertext,
                    iv,
                    tag,
                },
            ) => Ok(Zeroizing::new(cipher.open(key, iv, ciphertext, tag, aad)?)),
            (Self::Ephemeral { .. }, CipherText::Opaque { .. }) => Err(KeyError::Unsupported(
                "opaque ciphertext requires the producing provider".into(),
            )),
            (Self::Direct(spec), ciphertext) => spec.decrypt(ciphertext, aad).await,
        }
    }

    /// Encrypt this key for `recipient`. Direct keys produce an empty
    /// wrapped key.
    pub async fn wrap_for(&self, recipient: &KeySpecification) -> Result<WrappedKey> {
        match self {
            Self::Ephemeral { key, .. } => recipient.wrap(key).await,
            Self::Direct(_) => Ok(WrappedKey::empty()),
        }
    }
}
