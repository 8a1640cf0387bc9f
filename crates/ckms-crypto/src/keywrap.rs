//! Content-encryption-key wrapping.
//!
//! - AES-KW (RFC 3394) under a 128/192/256-bit KEK.
//! - AES-GCMKW (RFC 7518 §4.7): the CEK is encrypted with AES-GCM under the
//!   KEK and the IV/tag travel in the recipient header.

use aes_kw::{KekAes128, KekAes192, KekAes256};

use crate::aead::{ContentCipher, Sealed};
use crate::error::CryptoError;
use crate::types::AES_KW_OVERHEAD;

/// Smallest key AES-KW can wrap (two 64-bit blocks).
const AES_KW_MIN_INPUT: usize = 16;

/// Wrap `key` under `kek` with AES-KW. The KEK size selects the AES variant.
pub fn aes_kw_wrap(kek: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() < AES_KW_MIN_INPUT || key.len() % 8 != 0 {
        return Err(CryptoError::WrapFailed(format!(
            "key length {} is not a multiple of 8 bytes of at least {}",
            key.len(),
            AES_KW_MIN_INPUT
        )));
    }

    let mut wrapped = vec![0u8; key.len() + AES_KW_OVERHEAD];
    let outcome = match kek.len() {
        16 => KekAes128::from(kek_array::<16>(kek)?).wrap(key, &mut wrapped),
        24 => KekAes192::from(kek_array::<24>(kek)?).wrap(key, &mut wrapped),
        32 => KekAes256::from(kek_array::<32>(kek)?).wrap(key, &mut wrapped),
        got => {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got,
            })
        }
    };
    outcome.map_err(|e| CryptoError::WrapFailed(format!("{:?}", e)))?;

    Ok(wrapped)
}

/// Unwrap an AES-KW blob. Integrity check failure is `UnwrapFailed`.
pub fn aes_kw_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if wrapped.len() < AES_KW_MIN_INPUT + AES_KW_OVERHEAD || wrapped.len() % 8 != 0 {
        return Err(CryptoError::UnwrapFailed(format!(
            "wrapped key length {} is invalid",
            wrapped.len()
        )));
    }

    let mut key = vec![0u8; wrapped.len() - AES_KW_OVERHEAD];
    let outcome = match kek.len() {
        16 => KekAes128::from(kek_array::<16>(kek)?).unwrap(wrapped, &mut key),
        24 => KekAes192::from(kek_array::<24>(kek)?).unwrap(wrapped, &mut key),
        32 => KekAes256::from(kek_array::<32>(kek)?).unwrap(wrapped, &mut key),
        got => {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got,
            })
        }
    };
    outcome.map_err(|e| CryptoError::UnwrapFailed(format!("{:?}", e)))?;

    Ok(key)
}

/// Wrap `key` with AES-GCM under `kek` (fresh IV, empty AAD).
pub fn gcm_kw_wrap(kek: &[u8], key: &[u8]) -> Result<Sealed, CryptoError> {
    gcm_for(kek)?.seal(kek, key, b"")
}

/// Reverse of [`gcm_kw_wrap`].
pub fn gcm_kw_unwrap(
    kek: &[u8],
    iv: &[u8],
    encrypted_key: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    gcm_for(kek)?
        .open(kek, iv, encrypted_key, tag, b"")
        .map_err(|e| CryptoError::UnwrapFailed(e.to_string()))
}

fn gcm_for(kek: &[u8]) -> Result<ContentCipher, CryptoError> {
    ContentCipher::for_key_len(kek.len()).ok_or(CryptoError::InvalidKeyLength {
        expected: 32,
        got: kek.len(),
    })
}

fn kek_array<const N: usize>(kek: &[u8]) -> Result<[u8; N], CryptoError> {
    kek.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: N,
        got: kek.len(),
    })
}
