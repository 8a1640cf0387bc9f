//! Integration tests for the local provider: PEM files, inline material and
//! capability gating across key types.

use std::io::Write;

use ckms_core::{
    Algorithm, CipherText, KeyError, KeyOperation, KeySpecification, KeyType, Keychain,
    ProviderRegistry,
};
use ckms_crypto::{base64url_encode, Curve, KeyFamily, PrivateKey};
use serde_json::json;
use tempfile::NamedTempFile;

// ============================================================================
// Helpers
// ============================================================================

fn pem_file(pem: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(pem.as_bytes()).expect("write pem");
    file
}

async fn load(config: serde_json::Value) -> KeySpecification {
    KeySpecification::parse(&config, &ProviderRegistry::new())
        .expect("parse spec")
        .into_loaded()
        .await
        .expect("load spec")
}

// ============================================================================
// Key identifiers
// ============================================================================

#[tokio::test]
async fn same_pem_file_yields_same_kid() {
    for (kty, family, extra) in [
        ("EC", KeyFamily::Ec(Curve::P256), json!({})),
        ("EC", KeyFamily::Ec(Curve::P384), json!({"crv": "P-384"})),
        ("OKP", KeyFamily::Okp(Curve::Ed25519), json!({})),
        ("RSA", KeyFamily::Rsa, json!({})),
    ] {
        let key = PrivateKey::generate(family, 1024).expect("generate");
        let file = pem_file(&key.to_pkcs8_pem().expect("pem"));

        let mut config = json!({"kty": kty, "key": {"path": file.path()}});
        if let Some(crv) = extra.get("crv") {
            config["crv"] = crv.clone();
        }

        let first = load(config.clone()).await;
        let second = load(config).await;
        assert!(first.kid().is_some());
        assert_eq!(first.kid(), second.kid(), "{kty}");
    }
}

#[tokio::test]
async fn inline_and_file_pem_agree() {
    let key = PrivateKey::generate(KeyFamily::Ec(Curve::P256), 0).unwrap();
    let pem = key.to_pkcs8_pem().unwrap();
    let file = pem_file(&pem);

    let from_file = load(json!({"kty": "EC", "key": {"path": file.path()}})).await;
    let inline = load(json!({"kty": "EC", "key": {"pem": pem.as_str()}})).await;
    assert_eq!(from_file.kid(), inline.kid());
}

#[tokio::test]
async fn public_projection_keeps_kid() {
    let key = PrivateKey::generate(KeyFamily::Okp(Curve::Ed25519), 0).unwrap();
    let private = load(json!({"kty": "OKP", "key": {"pem": key.to_pkcs8_pem().unwrap().as_str()}})).await;
    let public_pem = key.public_key().to_pem().unwrap();
    let public = load(json!({"kty": "OKP", "key": {"pem": public_pem}})).await;

    assert_eq!(private.kid(), public.kid());
    assert_eq!(private.as_public().unwrap().kid(), public.kid());
    assert!(public.is_public());
}

#[tokio::test]
async fn different_material_different_kid() {
    let a = load(json!({"kty": "oct", "key": {"secret": base64url_encode(&[1u8; 32])}})).await;
    let b = load(json!({"kty": "oct", "key": {"secret": base64url_encode(&[2u8; 32])}})).await;
    let c = load(json!({"kty": "oct", "key": {"secret": base64url_encode(&[1u8; 32])}})).await;
    assert_ne!(a.kid(), b.kid());
    assert_eq!(a.kid(), c.kid());
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let err = KeySpecification::parse(
        &json!({"kty": "EC", "key": {"path": "/nonexistent/ckms/key.pem"}}),
        &ProviderRegistry::new(),
    )
    .unwrap()
    .into_loaded()
    .await
    .unwrap_err();
    assert!(matches!(err, KeyError::Io(_)));
}

// ============================================================================
// Capability gating
// ============================================================================

#[tokio::test]
async fn sign_is_forbidden_without_the_operation() {
    let configs = [
        json!({"alg": "ES256", "ops": ["verify"]}),
        json!({"alg": "ES384", "ops": ["verify"]}),
        json!({"alg": "EdDSA", "ops": ["verify"]}),
        json!({"alg": "PS256", "ops": ["verify"], "size": 1024}),
        json!({"alg": "HS512", "ops": ["verify"]}),
        json!({"alg": "A256GCM"}),
        json!({"alg": "RSA-OAEP-256", "size": 1024}),
    ];
    for config in configs {
        let spec = load(config.clone()).await;
        let err = spec.sign(b"message").await.unwrap_err();
        assert!(
            matches!(err, KeyError::ForbiddenOperation { operation: KeyOperation::Sign, .. }),
            "{config}: {err}"
        );
    }
}

#[tokio::test]
async fn public_keys_cannot_use_private_operations() {
    let spec = load(json!({"alg": "RSA-OAEP-256", "size": 1024})).await;
    let public = spec.as_public().unwrap();

    let wrapped = public.wrap(&[5u8; 32]).await.unwrap();
    assert!(matches!(
        public.unwrap(&wrapped).await,
        Err(KeyError::ForbiddenOperation { operation: KeyOperation::UnwrapKey, .. })
    ));
    assert_eq!(spec.unwrap(&wrapped).await.unwrap().as_slice(), &[5u8; 32]);

    let CipherText::Opaque { .. } = public.encrypt(b"short", b"").await.unwrap() else {
        panic!("RSA-OAEP output is a single opaque blob");
    };
}

#[tokio::test]
async fn every_signature_algorithm_round_trips() {
    for alg in Algorithm::ALL.into_iter().filter(|alg| alg.signature_scheme().is_some()) {
        let spec = KeySpecification::generate(alg)
            .with_size(if alg.key_type() == KeyType::Rsa { 1536 } else { 64 })
            .into_loaded()
            .await
            .unwrap();
        let signature = spec.sign(b"payload").await.unwrap();
        assert!(spec.verify(b"payload", &signature).await.unwrap(), "{alg}");
        assert!(!spec.verify(b"tampered", &signature).await.unwrap(), "{alg}");
    }
}

// ============================================================================
// Keychains
// ============================================================================

#[tokio::test]
async fn keychain_from_config_loads_everything() {
    let config = json!({
        "hmac": {"kty": "oct", "alg": "HS256", "kid": "k1"},
        "signing": {"kty": "EC", "crv": "P-256", "tags": ["primary"]},
        "wrapping": {"alg": "A128KW"},
    });
    let keychain = Keychain::from_config(&config, &ProviderRegistry::new())
        .unwrap()
        .into_loaded()
        .await
        .unwrap();

    assert_eq!(keychain.names().collect::<Vec<_>>(), vec!["hmac", "signing", "wrapping"]);
    assert_eq!(keychain.get("k1").unwrap().algorithm(), Algorithm::Hs256);
    assert_eq!(keychain.tagged(&["primary"]).len(), 1);
}

#[tokio::test]
async fn one_failing_key_fails_the_keychain() {
    let config = json!({
        "good": {"kty": "EC"},
        "bad": {"kty": "EC", "key": {"pem": "-----BEGIN NOTHING-----"}},
    });
    let mut keychain = Keychain::from_config(&config, &ProviderRegistry::new()).unwrap();
    assert!(keychain.load().await.is_err());
    assert!(keychain.iter().all(|spec| !spec.is_loaded()));
    assert!(keychain.filter(None, None, None).is_err());
}
