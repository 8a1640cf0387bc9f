//! AES-GCM content encryption.
//!
//! JWE carries the IV, ciphertext and tag as separate segments, so unlike a
//! self-framed blob the sealed output keeps the three parts apart.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::random::random_bytes;
use crate::types::{AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH};

type Aes192Gcm = AesGcm<Aes192, U12>;

/// The AES-GCM family used for JWE content encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentCipher {
    A128Gcm,
    A192Gcm,
    A256Gcm,
}

/// Output of one AEAD seal: ciphertext and tag are split so they can be
/// serialized as separate JOSE segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
}

impl ContentCipher {
    /// Registered JOSE `enc` name.
    pub fn name(self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "A128GCM" => Some(Self::A128Gcm),
            "A192GCM" => Some(Self::A192Gcm),
            "A256GCM" => Some(Self::A256Gcm),
            _ => None,
        }
    }

    /// Cipher matching a raw key length, used by AES-GCMKW.
    pub fn for_key_len(len: usize) -> Option<Self> {
        match len {
            16 => Some(Self::A128Gcm),
            24 => Some(Self::A192Gcm),
            32 => Some(Self::A256Gcm),
            _ => None,
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
        }
    }

    /// Generate a random key of the right size for this cipher.
    pub fn generate_key(self) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        Ok(Zeroizing::new(random_bytes(self.key_len())?))
    }

    /// Encrypt under a freshly generated 12-byte IV.
    pub fn seal(self, key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CryptoError> {
        let iv = random_bytes(AES_GCM_IV_LENGTH)?;
        self.seal_with_iv(key, &iv, plaintext, aad)
    }

    /// Encrypt under a caller supplied IV.
    pub fn seal_with_iv(
        self,
        key: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Sealed, CryptoError> {
        self.check_key(key)?;
        check_iv(iv)?;
        let mut ciphertext = match self {
            Self::A128Gcm => encrypt_with::<Aes128Gcm>(key, iv, plaintext, aad),
            Self::A192Gcm => encrypt_with::<Aes192Gcm>(key, iv, plaintext, aad),
            Self::A256Gcm => encrypt_with::<Aes256Gcm>(key, iv, plaintext, aad),
        }?;

        // aes-gcm appends the tag to the ciphertext
        let tag = ciphertext.split_off(ciphertext.len() - AES_GCM_TAG_LENGTH);
        Ok(Sealed {
            ciphertext,
            iv: iv.to_vec(),
            tag,
        })
    }

    /// Decrypt and authenticate. Any tag mismatch is a `DecryptionFailed`.
    pub fn open(
        self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.check_key(key)?;
        check_iv(iv)?;
        if tag.len() != AES_GCM_TAG_LENGTH {
            return Err(CryptoError::InvalidTagLength {
                expected: AES_GCM_TAG_LENGTH,
                got: tag.len(),
            });
        }

        let mut ct_with_tag = Vec::with_capacity(ciphertext.len() + tag.len());
        ct_with_tag.extend_from_slice(ciphertext);
        ct_with_tag.extend_from_slice(tag);

        match self {
            Self::A128Gcm => decrypt_with::<Aes128Gcm>(key, iv, &ct_with_tag, aad),
            Self::A192Gcm => decrypt_with::<Aes192Gcm>(key, iv, &ct_with_tag, aad),
            Self::A256Gcm => decrypt_with::<Aes256Gcm>(key, iv, &ct_with_tag, aad),
        }
    }

    fn check_key(self, key: &[u8]) -> Result<(), CryptoError> {
        if key.len() != self.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: self.key_len(),
                got: key.len(),
            });
        }
        Ok(())
    }
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != AES_GCM_IV_LENGTH {
        return Err(CryptoError::InvalidIvLength {
            expected: AES_GCM_IV_LENGTH,
            got: iv.len(),
        });
    }
    Ok(())
}

fn encrypt_with<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        C::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(iv), Payload { msg, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

fn decrypt_with<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8],
    msg: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        C::new_from_slice(key).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(iv), Payload { msg, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}
