//! Key identifier derivation.
//!
//! A `kid` is the Base64URL (unpadded) SHA3-256 digest of a fixed-layout
//! encoding of the public key material:
//!
//! | kty | hashed bytes |
//! |-----|--------------|
//! | EC  | `crv` name, `"EC"`, X, Y (curve width, big-endian) |
//! | RSA | e (3 bytes, big-endian), `"RSA"`, n (modulus width) |
//! | OKP | `crv` name, `"OKP"`, raw public key |
//! | oct | `"oct"`, SHA3-256(secret) |
//!
//! Remote symmetric keys never expose their secret, so they hash the
//! provider name and the key reference instead.

use ckms_crypto::{base64url_encode, sha3_256, PublicComponents, PublicKey};

/// Derive the `kid` of an asymmetric public key.
pub fn public_key_kid(key: &PublicKey) -> String {
    let digest = match key.components() {
        PublicComponents::Ec { curve, x, y } => {
            sha3_256(&[curve.name().as_bytes(), b"EC", &x, &y])
        }
        PublicComponents::Rsa { e, n, size } => {
            sha3_256(&[&left_pad(&e, 3), b"RSA", &left_pad(&n, size)])
        }
        PublicComponents::Okp { curve, raw } => {
            sha3_256(&[curve.name().as_bytes(), b"OKP", &raw])
        }
    };
    base64url_encode(&digest)
}

/// Derive the `kid` of a locally held symmetric secret.
pub fn secret_kid(secret: &[u8]) -> String {
    let inner = sha3_256(&[secret]);
    base64url_encode(&sha3_256(&[b"oct", &inner]))
}

/// Derive the `kid` of a symmetric key that lives in a remote KMS.
pub fn remote_secret_kid(provider: &str, key_ref: &str) -> String {
    base64url_encode(&sha3_256(&[
        b"oct",
        provider.as_bytes(),
        key_ref.as_bytes(),
    ]))
}

fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    if bytes.len() >= width {
        return bytes.to_vec();
    }
    let mut padded = vec![0u8; width - bytes.len()];
    padded.extend_from_slice(bytes);
    padded
}
