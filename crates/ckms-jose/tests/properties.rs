//! Structural and security properties of produced and parsed objects.

mod common;

use ckms_core::{Algorithm, KeyError, KeySpecification, Keychain, ProviderRegistry};
use ckms_crypto::base64url_encode;
use ckms_jose::{
    decode, DecodeOptions, Header, JoseError, JoseObject, JosePayload, SerializeOptions,
};
use serde_json::{json, Value};

use common::{flip_bit, key, keychain, with_segment};

// ============================================================================
// Compact form
// ============================================================================

#[tokio::test]
async fn hmac_jwt_example() {
    let k1 = KeySpecification::parse(
        &json!({"kty": "oct", "alg": "HS256", "kid": "k1"}),
        &ProviderRegistry::new(),
    )
    .expect("parse")
    .into_loaded()
    .await
    .expect("load");
    assert_eq!(k1.kid(), Some("k1"));

    let mut payload = JosePayload::jwt(&json!({"foo": "bar"})).expect("jwt");
    payload.add_signature(&k1, None, None).expect("sign");
    let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");
    assert_eq!(token.matches('.').count(), 2);

    let object = JoseObject::parse(&token).expect("parse");
    let header = object.headers()[0];
    assert_eq!(header.get_str("alg"), Some("HS256"));
    assert_eq!(header.get_str("kid"), Some("k1"));
    assert_eq!(header.get_str("typ"), Some("JWT"));

    let keys = Keychain::new().with("k1", k1).expect("keychain");
    let decoded = decode(&token, &keys, DecodeOptions::default()).await.expect("decode");
    assert_eq!(decoded.claims().expect("claims"), json!({"foo": "bar"}));
    assert!(decoded.jwt);

    assert!(!object.verify(&Keychain::new(), true).await.expect("verify"));
    assert!(matches!(
        decode(&token, &Keychain::new(), DecodeOptions::default()).await,
        Err(JoseError::InvalidSignature)
    ));
}

#[tokio::test]
async fn compact_segment_counts() {
    let signer = key(Algorithm::Es256).await;
    let kek = key(Algorithm::A128Kw).await;

    let mut jws = JosePayload::new(b"x".to_vec());
    jws.add_signature(&signer, None, None).expect("sign");
    let jws = jws.serialize(SerializeOptions::compact()).await.expect("jws");
    assert_eq!(jws.matches('.').count(), 2);

    let mut jwe = JosePayload::new(b"x".to_vec());
    jwe.add_recipient(&kek, None, false).expect("recipient");
    let jwe = jwe.serialize(SerializeOptions::compact()).await.expect("jwe");
    assert_eq!(jwe.matches('.').count(), 4);
}

#[tokio::test]
async fn compact_rejects_multiple_entries() {
    let first = key(Algorithm::A128Kw).await;
    let second = key(Algorithm::A256Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&first, None, false).expect("first");
    payload.add_recipient(&second, None, false).expect("second");
    assert!(matches!(
        payload.serialize(SerializeOptions::compact()).await,
        Err(JoseError::Serialization(_))
    ));

    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_signature(&key(Algorithm::Hs256).await, None, None).expect("first");
    payload.add_signature(&key(Algorithm::EdDsa).await, None, None).expect("second");
    assert!(matches!(
        payload.serialize(SerializeOptions::compact()).await,
        Err(JoseError::Serialization(_))
    ));
}

#[tokio::test]
async fn ecdh_parameters_move_to_the_protected_header() {
    let recipient = key(Algorithm::EcdhEsA128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload
        .add_recipient(&recipient.as_public().expect("public"), None, false)
        .expect("recipient");
    let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");

    let protected = Header::decode(token.split('.').next().expect("segment")).expect("header");
    assert_eq!(protected.get_str("alg"), Some("ECDH-ES+A128KW"));
    assert_eq!(
        protected.get("epk").and_then(|epk| epk.get("kty")),
        Some(&json!("EC"))
    );
}

// ============================================================================
// Direct encryption
// ============================================================================

#[tokio::test]
async fn direct_mode_has_no_encrypted_key() {
    let shared = key(Algorithm::A256Gcm).await;

    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&shared, None, true).expect("recipient");
    let compact = payload.serialize(SerializeOptions::compact()).await.expect("compact");
    assert_eq!(compact.split('.').nth(1), Some(""));
    let header = Header::decode(compact.split('.').next().expect("segment")).expect("header");
    assert_eq!(header.get_str("alg"), Some("dir"));
    assert_eq!(header.get_str("enc"), Some("A256GCM"));

    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&shared, None, true).expect("recipient");
    let general = payload.serialize(SerializeOptions::general()).await.expect("general");
    let value: Value = serde_json::from_str(&general).expect("json");
    let recipient = &value["recipients"][0];
    assert_eq!(recipient["header"]["alg"], json!("dir"));
    assert!(recipient
        .get("encrypted_key")
        .map_or(true, |key| key == &json!("")));
}

#[tokio::test]
async fn direct_recipient_stands_alone() {
    let shared = key(Algorithm::A128Gcm).await;
    let kek = key(Algorithm::A128Kw).await;

    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&shared, None, true).expect("direct");
    assert!(matches!(
        payload.add_recipient(&kek, None, false),
        Err(JoseError::DirectRecipient)
    ));

    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("wrapped");
    assert!(matches!(
        payload.add_recipient(&shared, None, true),
        Err(JoseError::DirectRecipient)
    ));
}

#[tokio::test]
async fn direct_mode_needs_a_content_key() {
    let kek = key(Algorithm::A128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    assert!(matches!(
        payload.add_recipient(&kek, None, true),
        Err(JoseError::CannotEncrypt(_))
    ));

    let signer = key(Algorithm::Es256).await;
    assert!(matches!(
        payload.add_recipient(&signer, None, false),
        Err(JoseError::CannotEncrypt(_))
    ));
}

// ============================================================================
// Headers
// ============================================================================

#[tokio::test]
async fn overlapping_headers_are_rejected_when_building() {
    let signer = key(Algorithm::Hs256).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    assert!(matches!(
        payload.add_signature(
            &signer,
            Some(Header::new().with("x5u", "https://a")),
            Some(Header::new().with("x5u", "https://b")),
        ),
        Err(JoseError::MalformedHeader(_))
    ));

    let kek = key(Algorithm::A128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let options = SerializeOptions::general()
        .with_protected(Header::new().with("jku", "https://a"))
        .with_unprotected(Header::new().with("jku", "https://b"));
    assert!(matches!(
        payload.serialize(options).await,
        Err(JoseError::MalformedHeader(_))
    ));
}

#[tokio::test]
async fn declared_alg_must_match_the_signer() {
    let signer = key(Algorithm::Hs256).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    assert!(matches!(
        payload.add_signature(&signer, Some(Header::new().with("alg", "HS512")), None),
        Err(JoseError::MalformedHeader(_))
    ));
}

#[tokio::test]
async fn overlapping_headers_are_rejected_when_parsing() {
    let kek = key(Algorithm::A128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let mut value: Value = serde_json::from_str(&token).expect("json");
    value["recipients"][0]["header"]["enc"] = json!("A128GCM");
    assert!(matches!(
        JoseObject::parse(value.to_string()),
        Err(JoseError::MalformedHeader(_))
    ));

    let signer = key(Algorithm::Hs256).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_signature(&signer, None, None).expect("sign");
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let mut value: Value = serde_json::from_str(&token).expect("json");
    value["signatures"][0]["header"] = json!({"alg": "HS256"});
    assert!(matches!(
        JoseObject::parse(value.to_string()),
        Err(JoseError::MalformedHeader(_))
    ));
}

#[tokio::test]
async fn unprotected_headers_are_reported() {
    let signer = key(Algorithm::Es384).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload
        .add_signature(&signer, None, Some(Header::new().with("x-trace", "abc")))
        .expect("sign");
    let token = payload.serialize(SerializeOptions::flattened()).await.expect("serialize");

    let object = JoseObject::parse(&token).expect("parse");
    let header = object.headers()[0];
    assert_eq!(header.get_str("x-trace"), Some("abc"));
    assert_eq!(header.get_str("alg"), Some("ES384"));
    assert!(object.verify(&keychain(&[&signer]), true).await.expect("verify"));
}

// ============================================================================
// Signatures
// ============================================================================

#[tokio::test]
async fn every_signature_must_verify() {
    let signers = [
        key(Algorithm::Hs256).await,
        key(Algorithm::Es256).await,
        key(Algorithm::EdDsa).await,
    ];
    let keys = keychain(&signers.iter().collect::<Vec<_>>());

    let mut payload = JosePayload::new(b"multi".to_vec());
    for signer in &signers {
        payload.add_signature(signer, None, None).expect("sign");
    }
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let object = JoseObject::parse(&token).expect("parse");
    assert_eq!(object.as_signed().expect("JWS").signature_count(), 3);
    assert!(object.verify(&keys, true).await.expect("verify"));

    for corrupted in 0..signers.len() {
        let mut value: Value = serde_json::from_str(&token).expect("json");
        let signature = value["signatures"][corrupted]["signature"]
            .as_str()
            .expect("signature")
            .to_string();
        value["signatures"][corrupted]["signature"] = json!(flip_bit(&signature, 7));

        let object = JoseObject::parse(value.to_string()).expect("parse");
        assert!(!object.verify(&keys, true).await.expect("verify"));
        assert!(matches!(
            decode(value.to_string(), &keys, DecodeOptions::default()).await,
            Err(JoseError::InvalidSignature)
        ));
    }
}

#[tokio::test]
async fn wrong_key_or_algorithm_does_not_verify() {
    let signer = key(Algorithm::Es256).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_signature(&signer, None, None).expect("sign");
    let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");

    let other = key(Algorithm::Es256).await;
    let object = JoseObject::parse(&token).expect("parse");
    assert!(!object.verify(&keychain(&[&other]), true).await.expect("verify"));

    let kid = signer.kid().expect("kid").to_string();
    let impostor = KeySpecification::generate(Algorithm::Hs256)
        .with_kid(kid)
        .into_loaded()
        .await
        .expect("load");
    assert!(!object.verify(&keychain(&[&impostor]), true).await.expect("verify"));
}

#[tokio::test]
async fn missing_kid_needs_permission() {
    let secret = key(Algorithm::Hs256).await;
    let protected = base64url_encode(br#"{"alg":"HS256"}"#);
    let body = base64url_encode(b"no kid");
    let signature = secret
        .sign(format!("{}.{}", protected, body).as_bytes())
        .await
        .expect("sign");
    let token = format!("{}.{}.{}", protected, body, base64url_encode(&signature));

    let keys = keychain(&[&secret]);
    let object = JoseObject::parse(&token).expect("parse");
    assert!(matches!(
        object.verify(&keys, true).await,
        Err(JoseError::MissingProtectedClaim("kid"))
    ));
    assert!(object.verify(&keys, false).await.expect("verify"));

    let decoded = decode(&token, &keys, DecodeOptions::default().allow_missing_kid())
        .await
        .expect("decode");
    assert_eq!(decoded.payload, b"no kid");
}

#[tokio::test]
async fn missing_alg_is_rejected() {
    let token = format!(
        "{}.{}.{}",
        base64url_encode(br#"{"kid":"k"}"#),
        base64url_encode(b"x"),
        base64url_encode(b"sig")
    );
    let object = JoseObject::parse(&token).expect("parse");
    assert!(matches!(
        object.verify(&Keychain::new(), true).await,
        Err(JoseError::MissingProtectedClaim("alg"))
    ));
}

#[tokio::test]
async fn signing_needs_permission() {
    let verifier = key(Algorithm::Es256).await.as_public().expect("public");
    let mut payload = JosePayload::new(b"x".to_vec());
    assert!(matches!(
        payload.add_signature(&verifier, None, None),
        Err(JoseError::Key(KeyError::ForbiddenOperation { .. }))
    ));

    let unloaded = KeySpecification::generate(Algorithm::Hs256);
    assert!(matches!(
        payload.add_signature(&unloaded, None, None),
        Err(JoseError::Key(KeyError::NotLoaded))
    ));
}

#[tokio::test]
async fn cannot_sign_after_encrypting() {
    let kek = key(Algorithm::A128Kw).await;
    let signer = key(Algorithm::Hs256).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    assert!(matches!(
        payload.add_signature(&signer, None, None),
        Err(JoseError::SignAfterEncrypt)
    ));
}

// ============================================================================
// Decryption
// ============================================================================

#[tokio::test]
async fn tampering_is_detected() {
    for alg in [Algorithm::A128Kw, Algorithm::A256GcmKw, Algorithm::A256Gcm] {
        let shared = key(alg).await;
        let direct = alg == Algorithm::A256Gcm;
        let mut payload = JosePayload::new(b"integrity matters".to_vec());
        payload.add_recipient(&shared, None, direct).expect("recipient");
        let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");
        let keys = keychain(&[&shared]);

        // ciphertext, then tag
        for segment in [3, 4] {
            let tampered = with_segment(&token, segment, |s| flip_bit(s, 0));
            let object = JoseObject::parse(&tampered).expect("parse");
            assert!(
                matches!(object.decrypt(&keys).await, Err(JoseError::Undecryptable(_))),
                "{alg} segment {segment}"
            );
        }

        let object = JoseObject::parse(&token).expect("parse");
        assert_eq!(object.decrypt(&keys).await.expect("decrypt"), b"integrity matters");
    }
}

#[tokio::test]
async fn stripped_iv_and_tag_are_undecryptable() {
    for (alg, direct) in [(Algorithm::A128Kw, false), (Algorithm::A128Gcm, true)] {
        let shared = key(alg).await;
        let mut payload = JosePayload::new(b"x".to_vec());
        payload.add_recipient(&shared, None, direct).expect("recipient");
        let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");

        let stripped = with_segment(&with_segment(&token, 2, |_| String::new()), 4, |_| String::new());
        let object = JoseObject::parse(&stripped).expect("parse");
        assert!(
            matches!(
                object.decrypt(&keychain(&[&shared])).await,
                Err(JoseError::Undecryptable(_))
            ),
            "{alg}"
        );
    }
}

#[tokio::test]
async fn tampered_encrypted_key_is_undecryptable() {
    let kek = key(Algorithm::A192Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");

    let tampered = with_segment(&token, 1, |s| flip_bit(s, 3));
    let object = JoseObject::parse(&tampered).expect("parse");
    assert!(matches!(
        object.decrypt(&keychain(&[&kek])).await,
        Err(JoseError::Undecryptable(_))
    ));
}

#[tokio::test]
async fn no_key_for_any_recipient() {
    let kek = key(Algorithm::A128Kw).await;
    let unrelated = key(Algorithm::A128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let object = JoseObject::parse(&token).expect("parse");
    assert!(matches!(
        object.decrypt(&keychain(&[&unrelated])).await,
        Err(JoseError::MalformedPayload(msg)) if msg == "no key could be found"
    ));
    assert!(object.payload().is_none());
}

#[tokio::test]
async fn recipient_without_kid_falls_back_to_matching_keys() {
    let kek = key(Algorithm::A256Kw).await;
    let decoy = key(Algorithm::A256Kw).await;
    let mut payload = JosePayload::new(b"anonymous".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let mut value: Value = serde_json::from_str(&token).expect("json");
    value["recipients"][0]["header"]
        .as_object_mut()
        .expect("header")
        .remove("kid");

    let object = JoseObject::parse(value.to_string()).expect("parse");
    let plaintext = object
        .decrypt(&keychain(&[&decoy, &kek]))
        .await
        .expect("decrypt");
    assert_eq!(plaintext, b"anonymous");
    assert_eq!(object.payload(), Some(b"anonymous".to_vec()));
}

#[tokio::test]
async fn earlier_decryption_does_not_bypass_checks() {
    let kek = key(Algorithm::A128GcmKw).await;
    let mut payload = JosePayload::new(b"secret".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload
        .serialize(SerializeOptions::general().with_aad(b"A".to_vec()))
        .await
        .expect("serialize");

    let keys = keychain(&[&kek]);
    let object = JoseObject::parse(&token).expect("parse");
    let jwe = object.as_encrypted().expect("JWE");
    assert_eq!(jwe.decrypt(&keys).await.expect("decrypt"), b"secret");
    assert_eq!(jwe.decrypt_with_aad(&keys, b"A").await.expect("decrypt"), b"secret");

    assert!(matches!(
        jwe.decrypt_with_aad(&keys, b"B").await,
        Err(JoseError::Undecryptable(_))
    ));
    assert!(matches!(
        jwe.decrypt(&Keychain::new()).await,
        Err(JoseError::MalformedPayload(msg)) if msg == "no key could be found"
    ));
    assert_eq!(jwe.plaintext(), Some(b"secret".to_vec()));
}

#[tokio::test]
async fn verifying_a_jwe_is_an_error() {
    let kek = key(Algorithm::A128Kw).await;
    let mut payload = JosePayload::new(b"x".to_vec());
    payload.add_recipient(&kek, None, false).expect("recipient");
    let token = payload.serialize(SerializeOptions::compact()).await.expect("serialize");
    let object = JoseObject::parse(&token).expect("parse");
    assert!(object.verify(&keychain(&[&kek]), true).await.is_err());
}

// ============================================================================
// Parsing
// ============================================================================

#[tokio::test]
async fn base64url_wrapped_json_parses() {
    let signer = key(Algorithm::Hs384).await;
    let mut payload = JosePayload::new(b"wrapped".to_vec());
    payload.add_signature(&signer, None, None).expect("sign");
    let token = payload.serialize(SerializeOptions::general()).await.expect("serialize");

    let wrapped = base64url_encode(token.as_bytes());
    let decoded = decode(&wrapped, &keychain(&[&signer]), DecodeOptions::default())
        .await
        .expect("decode");
    assert_eq!(decoded.payload, b"wrapped");
}

#[test]
fn garbage_is_malformed() {
    for input in ["", "not a token", "{\"payload\":1}", "a.b.c.d"] {
        assert!(JoseObject::parse(input).is_err(), "{input:?}");
    }
}
