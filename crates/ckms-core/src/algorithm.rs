//! Registered JOSE algorithms and the key metadata they imply.
//!
//! Each [`Algorithm`] fixes the key type, the key use, the digest or cipher
//! it runs with, and the operations a private (or secret) key holding it may
//! perform by default. Public projections are derived with
//! [`KeyOperation::public_counterpart`].

use std::collections::BTreeSet;
use std::fmt;

use ckms_crypto::{ContentCipher, Curve, DigestAlgorithm, KeyFamily, SignatureScheme};
use serde::{Deserialize, Serialize};

use crate::error::{KeyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "OKP")]
    Okp,
    #[serde(rename = "oct")]
    Oct,
}

impl KeyType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ec => "EC",
            Self::Rsa => "RSA",
            Self::Okp => "OKP",
            Self::Oct => "oct",
        }
    }

    pub fn is_symmetric(self) -> bool {
        self == Self::Oct
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
    Enc,
}

impl KeyUse {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sig => "sig",
            Self::Enc => "enc",
        }
    }
}

impl fmt::Display for KeyUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// JWK `key_ops` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyOperation {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
}

impl KeyOperation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
        }
    }

    /// The operation a public key can perform in place of this one.
    /// `None` for operations that only exist on the public side already.
    pub fn public_counterpart(self) -> Option<Self> {
        match self {
            Self::Sign => Some(Self::Verify),
            Self::Decrypt => Some(Self::Encrypt),
            Self::UnwrapKey => Some(Self::WrapKey),
            Self::Verify | Self::Encrypt | Self::WrapKey => None,
        }
    }

    pub fn is_public(self) -> bool {
        self.public_counterpart().is_none()
    }
}

impl fmt::Display for KeyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operations a public projection of `operations` retains.
pub fn public_operations(operations: &BTreeSet<KeyOperation>) -> BTreeSet<KeyOperation> {
    operations
        .iter()
        .map(|op| op.public_counterpart().unwrap_or(*op))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Hs256,
    Hs384,
    Hs512,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    Es256,
    Es384,
    EdDsa,
    RsaOaep256,
    EcdhEsA128Kw,
    EcdhEsA192Kw,
    EcdhEsA256Kw,
    A128Kw,
    A192Kw,
    A256Kw,
    A128GcmKw,
    A192GcmKw,
    A256GcmKw,
    A128Gcm,
    A192Gcm,
    A256Gcm,
}

impl Algorithm {
    pub const ALL: [Algorithm; 25] = [
        Self::Hs256,
        Self::Hs384,
        Self::Hs512,
        Self::Rs256,
        Self::Rs384,
        Self::Rs512,
        Self::Ps256,
        Self::Ps384,
        Self::Ps512,
        Self::Es256,
        Self::Es384,
        Self::EdDsa,
        Self::RsaOaep256,
        Self::EcdhEsA128Kw,
        Self::EcdhEsA192Kw,
        Self::EcdhEsA256Kw,
        Self::A128Kw,
        Self::A192Kw,
        Self::A256Kw,
        Self::A128GcmKw,
        Self::A192GcmKw,
        Self::A256GcmKw,
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
    ];

    /// Registered JOSE name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::EdDsa => "EdDSA",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::EcdhEsA128Kw => "ECDH-ES+A128KW",
            Self::EcdhEsA192Kw => "ECDH-ES+A192KW",
            Self::EcdhEsA256Kw => "ECDH-ES+A256KW",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::A128GcmKw => "A128GCMKW",
            Self::A192GcmKw => "A192GCMKW",
            Self::A256GcmKw => "A256GCMKW",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.name() == name)
            .ok_or_else(|| KeyError::UnknownAlgorithm(name.to_string()))
    }

    pub fn key_type(self) -> KeyType {
        match self {
            Self::Rs256
            | Self::Rs384
            | Self::Rs512
            | Self::Ps256
            | Self::Ps384
            | Self::Ps512
            | Self::RsaOaep256 => KeyType::Rsa,
            Self::Es256
            | Self::Es384
            | Self::EcdhEsA128Kw
            | Self::EcdhEsA192Kw
            | Self::EcdhEsA256Kw => KeyType::Ec,
            Self::EdDsa => KeyType::Okp,
            _ => KeyType::Oct,
        }
    }

    pub fn key_use(self) -> KeyUse {
        if self.signature_scheme().is_some() {
            KeyUse::Sig
        } else {
            KeyUse::Enc
        }
    }

    pub fn digest(self) -> Option<DigestAlgorithm> {
        match self {
            Self::Hs256 | Self::Rs256 | Self::Ps256 | Self::Es256 | Self::RsaOaep256 => {
                Some(DigestAlgorithm::Sha256)
            }
            Self::Hs384 | Self::Rs384 | Self::Ps384 | Self::Es384 => Some(DigestAlgorithm::Sha384),
            Self::Hs512 | Self::Rs512 | Self::Ps512 => Some(DigestAlgorithm::Sha512),
            Self::EcdhEsA128Kw | Self::EcdhEsA192Kw | Self::EcdhEsA256Kw => {
                Some(DigestAlgorithm::Sha256)
            }
            _ => None,
        }
    }

    /// Curve an EC or OKP algorithm is bound to.
    pub fn curve(self) -> Option<Curve> {
        match self {
            Self::Es256 | Self::EcdhEsA128Kw | Self::EcdhEsA192Kw | Self::EcdhEsA256Kw => {
                Some(Curve::P256)
            }
            Self::Es384 => Some(Curve::P384),
            Self::EdDsa => Some(Curve::Ed25519),
            _ => None,
        }
    }

    pub fn key_family(self) -> Option<KeyFamily> {
        match self.key_type() {
            KeyType::Ec => self.curve().map(KeyFamily::Ec),
            KeyType::Okp => self.curve().map(KeyFamily::Okp),
            KeyType::Rsa => Some(KeyFamily::Rsa),
            KeyType::Oct => None,
        }
    }

    pub fn signature_scheme(self) -> Option<SignatureScheme> {
        let digest = self.digest();
        match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => digest.map(SignatureScheme::Hmac),
            Self::Rs256 | Self::Rs384 | Self::Rs512 => digest.map(SignatureScheme::RsaPkcs1),
            Self::Ps256 | Self::Ps384 | Self::Ps512 => digest.map(SignatureScheme::RsaPss),
            Self::Es256 | Self::Es384 => digest.map(SignatureScheme::Ecdsa),
            Self::EdDsa => Some(SignatureScheme::EdDsa),
            _ => None,
        }
    }

    /// AES-GCM cipher for content encryption and AES-GCMKW algorithms.
    pub fn content_cipher(self) -> Option<ContentCipher> {
        match self {
            Self::A128Gcm | Self::A128GcmKw => Some(ContentCipher::A128Gcm),
            Self::A192Gcm | Self::A192GcmKw => Some(ContentCipher::A192Gcm),
            Self::A256Gcm | Self::A256GcmKw => Some(ContentCipher::A256Gcm),
            _ => None,
        }
    }

    /// Whether this is a content encryption (`enc`) algorithm.
    pub fn is_content_encryption(self) -> bool {
        matches!(self, Self::A128Gcm | Self::A192Gcm | Self::A256Gcm)
    }

    /// Key-encryption-key length in bytes for AES based key management.
    pub fn kek_len(self) -> Option<usize> {
        match self {
            Self::A128Kw | Self::A128GcmKw | Self::EcdhEsA128Kw => Some(16),
            Self::A192Kw | Self::A192GcmKw | Self::EcdhEsA192Kw => Some(24),
            Self::A256Kw | Self::A256GcmKw | Self::EcdhEsA256Kw => Some(32),
            _ => None,
        }
    }

    /// Default length of a generated symmetric secret.
    pub fn secret_len(self) -> Option<usize> {
        match self {
            Self::Hs256 => Some(32),
            Self::Hs384 => Some(48),
            Self::Hs512 => Some(64),
            Self::A128Gcm => Some(16),
            Self::A192Gcm => Some(24),
            Self::A256Gcm => Some(32),
            Self::A128Kw | Self::A192Kw | Self::A256Kw => self.kek_len(),
            Self::A128GcmKw | Self::A192GcmKw | Self::A256GcmKw => self.kek_len(),
            _ => None,
        }
    }

    /// Operations a private or secret key holding this algorithm performs
    /// unless overridden by configuration.
    pub fn default_operations(self) -> BTreeSet<KeyOperation> {
        use KeyOperation::*;
        let ops: &[KeyOperation] = match self {
            Self::Hs256 | Self::Hs384 | Self::Hs512 => &[Sign, Verify],
            Self::RsaOaep256 => &[Decrypt, UnwrapKey],
            Self::EcdhEsA128Kw | Self::EcdhEsA192Kw | Self::EcdhEsA256Kw => &[UnwrapKey],
            Self::A128Kw
            | Self::A192Kw
            | Self::A256Kw
            | Self::A128GcmKw
            | Self::A192GcmKw
            | Self::A256GcmKw => &[WrapKey, UnwrapKey],
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => &[Encrypt, Decrypt],
            _ => &[Sign],
        };
        ops.iter().copied().collect()
    }

    /// Every operation this algorithm can express, including public
    /// projections.
    pub fn supported_operations(self) -> BTreeSet<KeyOperation> {
        let mut ops = self.default_operations();
        ops.extend(public_operations(&ops));
        ops
    }

    /// Default algorithm for a key type, use and optional curve.
    pub fn default_for(kty: KeyType, key_use: KeyUse, curve: Option<Curve>) -> Result<Self> {
        let alg = match (kty, key_use) {
            (KeyType::Ec, KeyUse::Sig) => match curve {
                None | Some(Curve::P256) => Self::Es256,
                Some(Curve::P384) => Self::Es384,
                Some(other) => {
                    return Err(KeyError::InvalidSpec(format!(
                        "curve {} is not an EC curve",
                        other.name()
                    )))
                }
            },
            (KeyType::Ec, KeyUse::Enc) => Self::EcdhEsA256Kw,
            (KeyType::Rsa, KeyUse::Sig) => Self::Rs256,
            (KeyType::Rsa, KeyUse::Enc) => Self::RsaOaep256,
            (KeyType::Okp, KeyUse::Sig) => Self::EdDsa,
            (KeyType::Okp, KeyUse::Enc) => {
                return Err(KeyError::InvalidSpec(
                    "no encryption algorithm is registered for OKP keys".into(),
                ))
            }
            (KeyType::Oct, KeyUse::Sig) => Self::Hs256,
            (KeyType::Oct, KeyUse::Enc) => Self::A256Gcm,
        };
        Ok(alg)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for alg in Algorithm::ALL {
            assert_eq!(Algorithm::from_name(alg.name()).unwrap(), alg);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = Algorithm::from_name("none").unwrap_err();
        assert!(matches!(err, KeyError::UnknownAlgorithm(ref name) if name == "none"));
        assert!("HS257".parse::<Algorithm>().is_err());
    }

    #[test]
    fn defaults_per_key_type_and_use() {
        let cases = [
            (KeyType::Ec, KeyUse::Sig, None, Algorithm::Es256),
            (KeyType::Ec, KeyUse::Sig, Some(Curve::P384), Algorithm::Es384),
            (KeyType::Ec, KeyUse::Enc, None, Algorithm::EcdhEsA256Kw),
            (KeyType::Rsa, KeyUse::Sig, None, Algorithm::Rs256),
            (KeyType::Rsa, KeyUse::Enc, None, Algorithm::RsaOaep256),
            (KeyType::Okp, KeyUse::Sig, None, Algorithm::EdDsa),
            (KeyType::Oct, KeyUse::Sig, None, Algorithm::Hs256),
            (KeyType::Oct, KeyUse::Enc, None, Algorithm::A256Gcm),
        ];
        for (kty, key_use, curve, expected) in cases {
            assert_eq!(Algorithm::default_for(kty, key_use, curve).unwrap(), expected);
        }
        assert!(Algorithm::default_for(KeyType::Okp, KeyUse::Enc, None).is_err());
    }

    #[test]
    fn algorithm_metadata_is_consistent() {
        for alg in Algorithm::ALL {
            assert_eq!(alg.key_use() == KeyUse::Sig, alg.signature_scheme().is_some());
            if alg.key_type().is_symmetric() {
                assert!(alg.secret_len().is_some(), "{alg}");
            } else {
                assert!(alg.key_family().is_some(), "{alg}");
            }
        }
    }

    #[test]
    fn public_projection_maps_private_operations() {
        let ops = Algorithm::RsaOaep256.default_operations();
        let public = public_operations(&ops);
        assert!(public.contains(&KeyOperation::Encrypt));
        assert!(public.contains(&KeyOperation::WrapKey));
        assert!(!public.contains(&KeyOperation::Decrypt));

        let ops = Algorithm::Es256.default_operations();
        assert_eq!(
            public_operations(&ops).into_iter().collect::<Vec<_>>(),
            vec![KeyOperation::Verify]
        );
    }

    #[test]
    fn key_operations_use_jwk_names() {
        let json = serde_json::to_string(&KeyOperation::UnwrapKey).unwrap();
        assert_eq!(json, "\"unwrapKey\"");
        let kty: KeyType = serde_json::from_str("\"oct\"").unwrap();
        assert_eq!(kty, KeyType::Oct);
    }
}
