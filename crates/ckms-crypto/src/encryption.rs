//! RSA-OAEP with SHA-256 (JWA `RSA-OAEP-256`).

use p256::elliptic_curve::rand_core::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub fn rsa_oaep_encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

pub fn rsa_oaep_decrypt(
    key: &RsaPrivateKey,
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    key.decrypt(Oaep::new::<Sha256>(), ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oaep_round_trip() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let public = private.to_public_key();
        let ciphertext = rsa_oaep_encrypt(&public, b"content key bytes").unwrap();
        assert_eq!(ciphertext.len(), 128);
        let plaintext = rsa_oaep_decrypt(&private, &ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), b"content key bytes");
    }

    #[test]
    fn wrong_key_fails() {
        let a = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let b = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let ciphertext = rsa_oaep_encrypt(&a.to_public_key(), b"x").unwrap();
        assert!(rsa_oaep_decrypt(&b, &ciphertext).is_err());
    }
}
