//! Signature primitives: HMAC, ECDSA (P-256/P-384), EdDSA (Ed25519) and
//! RSA (PKCS#1 v1.5 and PSS).
//!
//! ECDSA signatures are IEEE P1363 format (raw r||s), as JWS requires.

use hmac::{Hmac, Mac};
use p256::elliptic_curve::rand_core::OsRng;
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use signature::{Signer, Verifier};

use crate::digest::DigestAlgorithm;
use crate::error::CryptoError;
use crate::keys::{PrivateKey, PublicKey};

/// How a message is turned into a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    Hmac(DigestAlgorithm),
    Ecdsa(DigestAlgorithm),
    RsaPkcs1(DigestAlgorithm),
    RsaPss(DigestAlgorithm),
    EdDsa,
}

/// Sign `message` with an asymmetric private key.
pub fn sign(
    key: &PrivateKey,
    scheme: SignatureScheme,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match (key, scheme) {
        (PrivateKey::P256(secret), SignatureScheme::Ecdsa(DigestAlgorithm::Sha256)) => {
            let signing_key = p256::ecdsa::SigningKey::from(secret);
            let signature: p256::ecdsa::Signature = signing_key
                .try_sign(message)
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        }
        (PrivateKey::P384(secret), SignatureScheme::Ecdsa(DigestAlgorithm::Sha384)) => {
            let signing_key = p384::ecdsa::SigningKey::from(secret);
            let signature: p384::ecdsa::Signature = signing_key
                .try_sign(message)
                .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
            Ok(signature.to_bytes().to_vec())
        }
        (PrivateKey::Ed25519(signing_key), SignatureScheme::EdDsa) => {
            Ok(signing_key.sign(message).to_bytes().to_vec())
        }
        (PrivateKey::Rsa(private), SignatureScheme::RsaPkcs1(digest)) => {
            rsa_sign_pkcs1(private, digest, message)
        }
        (PrivateKey::Rsa(private), SignatureScheme::RsaPss(digest)) => {
            rsa_sign_pss(private, digest, message)
        }
        (key, scheme) => Err(CryptoError::KeyMismatch(format!(
            "{:?} cannot produce {:?} signatures",
            key.family(),
            scheme
        ))),
    }
}

/// Verify a signature. Malformed signatures and key/scheme mismatches
/// verify as `false`; this never errors on attacker-controlled input.
pub fn verify(key: &PublicKey, scheme: SignatureScheme, message: &[u8], signature: &[u8]) -> bool {
    match (key, scheme) {
        (PublicKey::P256(public), SignatureScheme::Ecdsa(DigestAlgorithm::Sha256)) => {
            let Ok(signature) = p256::ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            p256::ecdsa::VerifyingKey::from(public)
                .verify(message, &signature)
                .is_ok()
        }
        (PublicKey::P384(public), SignatureScheme::Ecdsa(DigestAlgorithm::Sha384)) => {
            let Ok(signature) = p384::ecdsa::Signature::from_slice(signature) else {
                return false;
            };
            p384::ecdsa::VerifyingKey::from(public)
                .verify(message, &signature)
                .is_ok()
        }
        (PublicKey::Ed25519(public), SignatureScheme::EdDsa) => {
            let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                return false;
            };
            public.verify(message, &signature).is_ok()
        }
        (PublicKey::Rsa(public), SignatureScheme::RsaPkcs1(digest)) => {
            rsa_verify(public, digest, false, message, signature)
        }
        (PublicKey::Rsa(public), SignatureScheme::RsaPss(digest)) => {
            rsa_verify(public, digest, true, message, signature)
        }
        _ => false,
    }
}

/// Compute an HMAC tag.
pub fn hmac_sign(
    secret: &[u8],
    digest: DigestAlgorithm,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let invalid = |_| CryptoError::InvalidKeyLength {
        expected: digest.output_len(),
        got: secret.len(),
    };
    let tag = match digest {
        DigestAlgorithm::Sha256 => {
            let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        DigestAlgorithm::Sha384 => {
            let mut mac = <Hmac<Sha384> as Mac>::new_from_slice(secret).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        DigestAlgorithm::Sha512 => {
            let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(secret).map_err(invalid)?;
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(tag)
}

/// Constant-time HMAC verification.
pub fn hmac_verify(secret: &[u8], digest: DigestAlgorithm, message: &[u8], tag: &[u8]) -> bool {
    match digest {
        DigestAlgorithm::Sha256 => <Hmac<Sha256> as Mac>::new_from_slice(secret)
            .map(|mac| mac.chain_update(message).verify_slice(tag).is_ok())
            .unwrap_or(false),
        DigestAlgorithm::Sha384 => <Hmac<Sha384> as Mac>::new_from_slice(secret)
            .map(|mac| mac.chain_update(message).verify_slice(tag).is_ok())
            .unwrap_or(false),
        DigestAlgorithm::Sha512 => <Hmac<Sha512> as Mac>::new_from_slice(secret)
            .map(|mac| mac.chain_update(message).verify_slice(tag).is_ok())
            .unwrap_or(false),
    }
}

fn pkcs1_padding(digest: DigestAlgorithm) -> Pkcs1v15Sign {
    match digest {
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
    }
}

fn pss_padding(digest: DigestAlgorithm) -> Pss {
    match digest {
        DigestAlgorithm::Sha256 => Pss::new::<Sha256>(),
        DigestAlgorithm::Sha384 => Pss::new::<Sha384>(),
        DigestAlgorithm::Sha512 => Pss::new::<Sha512>(),
    }
}

fn rsa_sign_pkcs1(
    key: &RsaPrivateKey,
    digest: DigestAlgorithm,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let hashed = digest.digest(message);
    key.sign(pkcs1_padding(digest), &hashed)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))
}

fn rsa_sign_pss(
    key: &RsaPrivateKey,
    digest: DigestAlgorithm,
    message: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let hashed = digest.digest(message);
    key.sign_with_rng(&mut OsRng, pss_padding(digest), &hashed)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))
}

fn rsa_verify(
    key: &RsaPublicKey,
    digest: DigestAlgorithm,
    pss: bool,
    message: &[u8],
    signature: &[u8],
) -> bool {
    let hashed = digest.digest(message);
    let outcome = if pss {
        key.verify(pss_padding(digest), &hashed, signature)
    } else {
        key.verify(pkcs1_padding(digest), &hashed, signature)
    };
    outcome.is_ok()
}
