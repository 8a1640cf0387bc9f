//! Raw asymmetric key material.
//!
//! These are the key handles the primitive operations in [`crate::signing`],
//! [`crate::encryption`] and [`crate::ecdh`] accept. Nothing here knows about
//! JOSE algorithms or key specifications.

use std::fmt;

use ed25519_dalek::pkcs8::{
    DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _,
};
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::pkcs8::{
    DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _,
    LineEnding,
};
use rsa::pkcs1::{DecodeRsaPrivateKey as _, DecodeRsaPublicKey as _};
use rsa::pkcs8::{
    DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _,
};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::base64url::{base64url_decode, base64url_encode};
use crate::error::CryptoError;

/// Named curves for EC and OKP keys, spelled as JOSE `crv` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Curve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    Ed25519,
}

impl Curve {
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::Ed25519 => "Ed25519",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "Ed25519" => Some(Self::Ed25519),
            _ => None,
        }
    }

    /// Width in bytes of one affine coordinate (or of the raw public key for
    /// edwards curves).
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 | Self::Ed25519 => 32,
            Self::P384 => 48,
        }
    }

    pub fn is_edwards(self) -> bool {
        matches!(self, Self::Ed25519)
    }
}

/// Which parser to apply to PEM input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Ec(Curve),
    Rsa,
    Okp(Curve),
}

/// A private asymmetric key held in process memory.
#[derive(Clone)]
pub enum PrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    Rsa(Box<RsaPrivateKey>),
    Ed25519(Box<ed25519_dalek::SigningKey>),
}

/// A public asymmetric key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    Rsa(RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

/// Public key material, one shape per key family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicComponents {
    /// Affine coordinates, each exactly the curve's coordinate width.
    Ec { curve: Curve, x: Vec<u8>, y: Vec<u8> },
    /// Big-endian exponent and modulus. `size` is the modulus width in bytes.
    Rsa { e: Vec<u8>, n: Vec<u8>, size: usize },
    Okp { curve: Curve, raw: Vec<u8> },
}

/// Split a SEC1 uncompressed point, `0x04 || X || Y`.
fn ec_components(curve: Curve, uncompressed: &[u8]) -> PublicComponents {
    let (x, y) = uncompressed[1..].split_at(curve.coordinate_len());
    PublicComponents::Ec {
        curve,
        x: x.to_vec(),
        y: y.to_vec(),
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey").field(&self.family()).finish()
    }
}

impl PrivateKey {
    /// Generate a fresh key for `family`. `rsa_bits` only applies to RSA.
    pub fn generate(family: KeyFamily, rsa_bits: usize) -> Result<Self, CryptoError> {
        match family {
            KeyFamily::Ec(Curve::P256) => Ok(Self::P256(p256::SecretKey::random(&mut OsRng))),
            KeyFamily::Ec(Curve::P384) => Ok(Self::P384(p384::SecretKey::random(&mut OsRng))),
            KeyFamily::Rsa => RsaPrivateKey::new(&mut OsRng, rsa_bits)
                .map(|key| Self::Rsa(Box::new(key)))
                .map_err(|e| CryptoError::KeyGeneration(e.to_string())),
            KeyFamily::Okp(Curve::Ed25519) => Ok(Self::Ed25519(Box::new(
                ed25519_dalek::SigningKey::generate(&mut OsRng),
            ))),
            other => Err(CryptoError::KeyGeneration(format!(
                "unsupported key family {:?}",
                other
            ))),
        }
    }

    /// Parse a PEM private key. PKCS#8 is tried first; RSA also accepts
    /// PKCS#1 and EC also accepts SEC1.
    pub fn from_pem(pem: &str, family: KeyFamily) -> Result<Self, CryptoError> {
        let invalid = |e: &dyn fmt::Display| CryptoError::InvalidPem(e.to_string());
        match family {
            KeyFamily::Ec(Curve::P256) => p256::SecretKey::from_pkcs8_pem(pem)
                .or_else(|_| p256::SecretKey::from_sec1_pem(pem))
                .map(Self::P256)
                .map_err(|e| invalid(&e)),
            KeyFamily::Ec(Curve::P384) => p384::SecretKey::from_pkcs8_pem(pem)
                .or_else(|_| p384::SecretKey::from_sec1_pem(pem))
                .map(Self::P384)
                .map_err(|e| invalid(&e)),
            KeyFamily::Rsa => match RsaPrivateKey::from_pkcs8_pem(pem) {
                Ok(key) => Ok(Self::Rsa(Box::new(key))),
                Err(_) => RsaPrivateKey::from_pkcs1_pem(pem)
                    .map(|key| Self::Rsa(Box::new(key)))
                    .map_err(|e| invalid(&e)),
            },
            KeyFamily::Okp(Curve::Ed25519) => ed25519_dalek::SigningKey::from_pkcs8_pem(pem)
                .map(|key| Self::Ed25519(Box::new(key)))
                .map_err(|e| invalid(&e)),
            other => Err(CryptoError::InvalidPem(format!(
                "unsupported key family {:?}",
                other
            ))),
        }
    }

    /// Export as PKCS#8 PEM.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        let pem = match self {
            Self::P256(key) => key.to_pkcs8_pem(LineEnding::LF),
            Self::P384(key) => key.to_pkcs8_pem(LineEnding::LF),
            Self::Rsa(key) => key.to_pkcs8_pem(LineEnding::LF),
            Self::Ed25519(key) => key.to_pkcs8_pem(LineEnding::LF),
        };
        pem.map_err(|e| CryptoError::InvalidPem(e.to_string()))
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::P256(key) => PublicKey::P256(key.public_key()),
            Self::P384(key) => PublicKey::P384(key.public_key()),
            Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            Self::P256(_) => KeyFamily::Ec(Curve::P256),
            Self::P384(_) => KeyFamily::Ec(Curve::P384),
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ed25519(_) => KeyFamily::Okp(Curve::Ed25519),
        }
    }
}

impl PublicKey {
    /// Parse a PEM public key (SubjectPublicKeyInfo; RSA also accepts PKCS#1).
    pub fn from_pem(pem: &str, family: KeyFamily) -> Result<Self, CryptoError> {
        let invalid = |e: &dyn fmt::Display| CryptoError::InvalidPem(e.to_string());
        match family {
            KeyFamily::Ec(Curve::P256) => p256::PublicKey::from_public_key_pem(pem)
                .map(Self::P256)
                .map_err(|e| invalid(&e)),
            KeyFamily::Ec(Curve::P384) => p384::PublicKey::from_public_key_pem(pem)
                .map(Self::P384)
                .map_err(|e| invalid(&e)),
            KeyFamily::Rsa => match RsaPublicKey::from_public_key_pem(pem) {
                Ok(key) => Ok(Self::Rsa(key)),
                Err(_) => RsaPublicKey::from_pkcs1_pem(pem)
                    .map(Self::Rsa)
                    .map_err(|e| invalid(&e)),
            },
            KeyFamily::Okp(Curve::Ed25519) => {
                ed25519_dalek::VerifyingKey::from_public_key_pem(pem)
                    .map(Self::Ed25519)
                    .map_err(|e| invalid(&e))
            }
            other => Err(CryptoError::InvalidPem(format!(
                "unsupported key family {:?}",
                other
            ))),
        }
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            Self::P256(_) => KeyFamily::Ec(Curve::P256),
            Self::P384(_) => KeyFamily::Ec(Curve::P384),
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ed25519(_) => KeyFamily::Okp(Curve::Ed25519),
        }
    }

    /// Export as SubjectPublicKeyInfo PEM.
    pub fn to_pem(&self) -> Result<String, CryptoError> {
        let pem = match self {
            Self::P256(key) => key.to_public_key_pem(LineEnding::LF),
            Self::P384(key) => key.to_public_key_pem(LineEnding::LF),
            Self::Rsa(key) => key.to_public_key_pem(LineEnding::LF),
            Self::Ed25519(key) => key.to_public_key_pem(LineEnding::LF),
        };
        pem.map_err(|e| CryptoError::InvalidPem(e.to_string()))
    }

    /// Public material in its family's shape.
    pub fn components(&self) -> PublicComponents {
        match self {
            Self::P256(key) => ec_components(Curve::P256, key.to_encoded_point(false).as_bytes()),
            Self::P384(key) => ec_components(Curve::P384, key.to_encoded_point(false).as_bytes()),
            Self::Rsa(key) => PublicComponents::Rsa {
                e: key.e().to_bytes_be(),
                n: key.n().to_bytes_be(),
                size: key.size(),
            },
            Self::Ed25519(key) => PublicComponents::Okp {
                curve: Curve::Ed25519,
                raw: key.to_bytes().to_vec(),
            },
        }
    }

    /// Public JWK (RFC 7517) members for this key.
    pub fn to_jwk(&self) -> Value {
        match self.components() {
            PublicComponents::Ec { curve, x, y } => json!({
                "kty": "EC",
                "crv": curve.name(),
                "x": base64url_encode(&x),
                "y": base64url_encode(&y),
            }),
            PublicComponents::Rsa { e, n, .. } => json!({
                "kty": "RSA",
                "n": base64url_encode(&n),
                "e": base64url_encode(&e),
            }),
            PublicComponents::Okp { curve, raw } => json!({
                "kty": "OKP",
                "crv": curve.name(),
                "x": base64url_encode(&raw),
            }),
        }
    }

    /// Import a public JWK.
    pub fn from_jwk(jwk: &Value) -> Result<Self, CryptoError> {
        let member = |name: &'static str| -> Result<Vec<u8>, CryptoError> {
            let encoded = jwk
                .get(name)
                .and_then(Value::as_str)
                .ok_or(CryptoError::MissingJwkField(name))?;
            base64url_decode(encoded)
                .map_err(|e| CryptoError::InvalidJwk(format!("{}: {}", name, e)))
        };

        let kty = jwk
            .get("kty")
            .and_then(Value::as_str)
            .ok_or(CryptoError::MissingJwkField("kty"))?;
        match kty {
            "EC" => {
                let crv = jwk
                    .get("crv")
                    .and_then(Value::as_str)
                    .ok_or(CryptoError::MissingJwkField("crv"))?;
                let curve = Curve::from_name(crv)
                    .filter(|c| !c.is_edwards())
                    .ok_or_else(|| CryptoError::InvalidJwk(format!("unsupported crv {}", crv)))?;
                let sec1 = uncompressed_point(&member("x")?, &member("y")?, curve)?;
                match curve {
                    Curve::P256 => {
                        let point = p256::EncodedPoint::from_bytes(&sec1)
                            .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?;
                        Option::from(p256::PublicKey::from_encoded_point(&point))
                            .map(Self::P256)
                            .ok_or_else(|| CryptoError::InvalidJwk("point not on P-256".into()))
                    }
                    _ => {
                        let point = p384::EncodedPoint::from_bytes(&sec1)
                            .map_err(|e| CryptoError::InvalidJwk(e.to_string()))?;
                        Option::from(p384::PublicKey::from_encoded_point(&point))
                            .map(Self::P384)
                            .ok_or_else(|| CryptoError::InvalidJwk("point not on P-384".into()))
                    }
                }
            }
            "RSA" => {
                let n = BigUint::from_bytes_be(&member("n")?);
                let e = BigUint::from_bytes_be(&member("e")?);
                RsaPublicKey::new(n, e)
                    .map(Self::Rsa)
                    .map_err(|e| CryptoError::InvalidJwk(e.to_string()))
            }
            "OKP" => {
                let x = member("x")?;
                let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| {
                    CryptoError::InvalidJwk(format!("Ed25519 key must be 32 bytes, got {}", x.len()))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map(Self::Ed25519)
                    .map_err(|e| CryptoError::InvalidJwk(e.to_string()))
            }
            other => Err(CryptoError::InvalidJwk(format!("unsupported kty {}", other))),
        }
    }
}

/// Build `0x04 || x || y`, left-padding coordinates that omit leading zeros.
fn uncompressed_point(x: &[u8], y: &[u8], curve: Curve) -> Result<Vec<u8>, CryptoError> {
    let width = curve.coordinate_len();
    if x.len() > width || y.len() > width {
        return Err(CryptoError::InvalidJwk(format!(
            "coordinate longer than {} bytes",
            width
        )));
    }
    let mut point = Vec::with_capacity(1 + 2 * width);
    point.push(0x04);
    point.extend(std::iter::repeat(0u8).take(width - x.len()));
    point.extend_from_slice(x);
    point.extend(std::iter::repeat(0u8).take(width - y.len()));
    point.extend_from_slice(y);
    Ok(point)
}
