#![allow(dead_code)]

use ckms_core::{Algorithm, KeySpecification, KeyType, Keychain};
use ckms_crypto::{base64url_decode, base64url_encode};

/// Loaded key for `alg`. RSA keys are kept small enough for fast tests but
/// large enough for PSS with SHA-512.
pub async fn key(alg: Algorithm) -> KeySpecification {
    let spec = KeySpecification::generate(alg);
    let spec = if alg.key_type() == KeyType::Rsa {
        spec.with_size(1536)
    } else {
        spec
    };
    spec.into_loaded().await.expect("load key")
}

pub fn keychain(keys: &[&KeySpecification]) -> Keychain {
    let mut keychain = Keychain::new();
    for (i, key) in keys.iter().enumerate() {
        keychain
            .add(format!("key-{}", i), (*key).clone())
            .expect("add key");
    }
    keychain
}

/// Flip one bit of a Base64URL segment.
pub fn flip_bit(segment: &str, index: usize) -> String {
    let mut bytes = base64url_decode(segment).expect("decode segment");
    let index = index % bytes.len();
    bytes[index] ^= 0x01;
    base64url_encode(&bytes)
}

/// Replace compact segment `index` with `replace(segment)`.
pub fn with_segment(token: &str, index: usize, replace: impl Fn(&str) -> String) -> String {
    token
        .split('.')
        .enumerate()
        .map(|(i, segment)| if i == index { replace(segment) } else { segment.to_string() })
        .collect::<Vec<_>>()
        .join(".")
}
