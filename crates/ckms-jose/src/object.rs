//! The decoder: parses any serialization and decrypts or verifies it
//! against a keychain.

use ckms_core::{Algorithm, CipherText, ContentEncryptionKey, KeySpecification, Keychain, WrappedKey};
use ckms_crypto::{base64url_decode, base64url_encode, PublicKey};
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{content_undecryptable, undecryptable, JoseError, Result};
use crate::header::{merge, Header};
use crate::wire::{aad_input, JsonObject, JweJson, JwsJson};

/// `cty` values announcing a nested JOSE object.
const NESTED_CONTENT_TYPES: [&str; 3] = ["JWT", "JOSE", "JOSE+JSON"];

/// A parsed JWS or JWE.
#[derive(Debug)]
pub enum JoseObject {
    Signed(JwsObject),
    Encrypted(JweObject),
}

impl JoseObject {
    /// Parse compact, flattened or general serializations. JSON input may
    /// itself be Base64URL-encoded.
    pub fn parse(input: impl AsRef<[u8]>) -> Result<Self> {
        let text = std::str::from_utf8(input.as_ref())
            .map_err(|e| JoseError::MalformedObject(e.to_string()))?
            .trim();

        let is_compact = match (text.find('.'), text.find('{')) {
            (Some(dot), Some(brace)) => dot < brace,
            (Some(_), None) => true,
            _ => false,
        };
        if is_compact {
            let segments: Vec<&str> = text.split('.').collect();
            return match segments.as_slice() {
                [protected, payload, signature] => {
                    JwsObject::from_compact(protected, payload, signature).map(Self::Signed)
                }
                [protected, encrypted_key, iv, ciphertext, tag] => {
                    JweObject::from_compact(protected, encrypted_key, iv, ciphertext, tag)
                        .map(Self::Encrypted)
                }
                other => Err(JoseError::MalformedObject(format!(
                    "compact serialization has {} segments",
                    other.len()
                ))),
            };
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(json_err) => {
                let decoded = base64url_decode(text)
                    .map_err(|_| JoseError::MalformedObject(json_err.to_string()))?;
                serde_json::from_slice(&decoded)
                    .map_err(|e| JoseError::MalformedObject(e.to_string()))?
            }
        };
        match JsonObject::from_value(value)? {
            JsonObject::Jws(jws) => JwsObject::from_json(jws).map(Self::Signed),
            JsonObject::Jwe(jwe) => JweObject::from_json(jwe).map(Self::Encrypted),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Self::Signed(_))
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }

    pub fn as_signed(&self) -> Option<&JwsObject> {
        match self {
            Self::Signed(jws) => Some(jws),
            Self::Encrypted(_) => None,
        }
    }

    pub fn as_encrypted(&self) -> Option<&JweObject> {
        match self {
            Self::Encrypted(jwe) => Some(jwe),
            Self::Signed(_) => None,
        }
    }

    /// Decrypt a JWE. Fails for a JWS.
    pub async fn decrypt(&self, keychain: &Keychain) -> Result<Vec<u8>> {
        match self {
            Self::Encrypted(jwe) => jwe.decrypt(keychain).await,
            Self::Signed(_) => Err(JoseError::MalformedObject("a JWS cannot be decrypted".into())),
        }
    }

    /// Verify a JWS. Fails for a JWE.
    pub async fn verify(&self, keychain: &Keychain, require_kid: bool) -> Result<bool> {
        match self {
            Self::Signed(jws) => jws.verify(keychain, require_kid).await,
            Self::Encrypted(_) => Err(JoseError::MalformedObject("a JWE cannot be verified".into())),
        }
    }

    /// JWS payload, or JWE plaintext once decrypted.
    pub fn payload(&self) -> Option<Vec<u8>> {
        match self {
            Self::Signed(jws) => Some(jws.payload().to_vec()),
            Self::Encrypted(jwe) => jwe.plaintext(),
        }
    }

    pub fn claims(&self) -> Result<Value> {
        match self {
            Self::Signed(jws) => jws.claims(),
            Self::Encrypted(jwe) => jwe.claims(),
        }
    }

    /// JOSE Header of every signature or recipient.
    pub fn headers(&self) -> Vec<&Header> {
        match self {
            Self::Signed(jws) => jws.headers(),
            Self::Encrypted(jwe) => jwe.headers(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Signed(jws) => jws.content_type(),
            Self::Encrypted(jwe) => jwe.content_type(),
        }
    }

    pub fn is_nested(&self) -> bool {
        self.content_type().is_some_and(is_nested_content_type)
    }

    pub fn is_jwt(&self) -> bool {
        self.headers()
            .iter()
            .any(|header| header.get_str("typ").is_some_and(|typ| media_type(typ) == "JWT"))
    }
}

/// RFC 7515 §4.1.10: the `application/` prefix may be omitted and media
/// types compare case-insensitively.
fn media_type(value: &str) -> String {
    let upper = value.to_ascii_uppercase();
    match upper.strip_prefix("APPLICATION/") {
        Some(rest) => rest.to_string(),
        None => upper,
    }
}

pub(crate) fn is_nested_content_type(cty: &str) -> bool {
    NESTED_CONTENT_TYPES.contains(&media_type(cty).as_str())
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>> {
    base64url_decode(segment).map_err(|e| JoseError::MalformedObject(format!("{}: {}", name, e)))
}

// ============================================================================
// JWS
// ============================================================================

#[derive(Debug)]
struct SignatureEntry {
    protected_segment: String,
    header: Header,
    signature: Vec<u8>,
}

/// A parsed JWS with one or more signatures.
#[derive(Debug)]
pub struct JwsObject {
    payload_segment: String,
    payload: Vec<u8>,
    signatures: Vec<SignatureEntry>,
}

impl JwsObject {
    fn from_compact(protected: &str, payload: &str, signature: &str) -> Result<Self> {
        let header = Header::decode(protected)?;
        Ok(Self {
            payload_segment: payload.to_string(),
            payload: decode_segment("payload", payload)?,
            signatures: vec![SignatureEntry {
                protected_segment: protected.to_string(),
                header,
                signature: decode_segment("signature", signature)?,
            }],
        })
    }

    fn from_json(jws: JwsJson) -> Result<Self> {
        if jws.signatures.is_empty() {
            return Err(JoseError::MalformedObject("JWS has no signatures".into()));
        }
        let mut signatures = Vec::with_capacity(jws.signatures.len());
        for entry in jws.signatures {
            let protected = Header::decode(&entry.protected)?;
            signatures.push(SignatureEntry {
                header: merge(&[&protected, &entry.header])?,
                protected_segment: entry.protected,
                signature: decode_segment("signature", &entry.signature)?,
            });
        }
        Ok(Self {
            payload: decode_segment("payload", &jws.payload)?,
            payload_segment: jws.payload,
            signatures,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn claims(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload).map_err(|e| JoseError::MalformedPayload(e.to_string()))
    }

    pub fn headers(&self) -> Vec<&Header> {
        self.signatures.iter().map(|entry| &entry.header).collect()
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.signatures.first().and_then(|entry| entry.header.get_str("cty"))
    }

    pub fn is_nested(&self) -> bool {
        self.content_type().is_some_and(is_nested_content_type)
    }

    /// True only when every signature verifies.
    ///
    /// A signature naming a `kid` is checked against exactly that key, which
    /// must declare the same algorithm. Without a `kid` and with
    /// `require_kid` unset, every key able to verify the algorithm is tried.
    pub async fn verify(&self, keychain: &Keychain, require_kid: bool) -> Result<bool> {
        let results = join_all(
            self.signatures
                .iter()
                .map(|entry| self.verify_entry(entry, keychain, require_kid)),
        )
        .await;

        let mut valid = true;
        for result in results {
            valid &= result?;
        }
        tracing::debug!(signatures = self.signatures.len(), valid, "JWS verified");
        Ok(valid)
    }

    async fn verify_entry(
        &self,
        entry: &SignatureEntry,
        keychain: &Keychain,
        require_kid: bool,
    ) -> Result<bool> {
        let alg = entry
            .header
            .get_str("alg")
            .ok_or(JoseError::MissingProtectedClaim("alg"))?;
        let alg = Algorithm::from_name(alg)?;
        let signing_input = format!("{}.{}", entry.protected_segment, self.payload_segment);

        match entry.header.get_str("kid") {
            Some(kid) => {
                let Some(key) = keychain.find(kid) else {
                    tracing::debug!(kid, "no key for signature");
                    return Ok(false);
                };
                if key.algorithm() != alg {
                    tracing::debug!(kid, alg = %alg, key_alg = %key.algorithm(), "algorithm mismatch");
                    return Ok(false);
                }
                Ok(key.verify(signing_input.as_bytes(), &entry.signature).await?)
            }
            None if require_kid => Err(JoseError::MissingProtectedClaim("kid")),
            None => {
                let candidates = keychain
                    .iter()
                    .filter(|key| key.algorithm() == alg && key.can_verify());
                for key in candidates {
                    if key.verify(signing_input.as_bytes(), &entry.signature).await? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

// ============================================================================
// JWE
// ============================================================================

#[derive(Debug)]
struct RecipientEntry {
    header: Header,
    encrypted_key: Vec<u8>,
}

impl RecipientEntry {
    fn alg(&self) -> Option<&str> {
        self.header.get_str("alg")
    }

    fn kid(&self) -> Option<&str> {
        self.header.get_str("kid")
    }

    fn wrapped_key(&self) -> Result<WrappedKey> {
        let epk = match self.header.get("epk") {
            Some(jwk) => Some(
                PublicKey::from_jwk(jwk)
                    .map_err(|e| JoseError::MalformedHeader(format!("epk: {}", e)))?,
            ),
            None => None,
        };
        Ok(WrappedKey {
            encrypted_key: self.encrypted_key.clone(),
            iv: self.header.get_bytes("iv")?,
            tag: self.header.get_bytes("tag")?,
            epk,
            apu: self.header.get_bytes("apu")?,
            apv: self.header.get_bytes("apv")?,
        })
    }
}

/// A parsed JWE with one or more recipients.
#[derive(Debug)]
pub struct JweObject {
    protected_segment: String,
    aad_segment: Option<String>,
    recipients: Vec<RecipientEntry>,
    ciphertext: CipherText,
    plaintext: Mutex<Option<Vec<u8>>>,
}

impl JweObject {
    fn from_compact(
        protected: &str,
        encrypted_key: &str,
        iv: &str,
        ciphertext: &str,
        tag: &str,
    ) -> Result<Self> {
        let header = Header::decode(protected)?;
        Ok(Self {
            protected_segment: protected.to_string(),
            aad_segment: None,
            recipients: vec![RecipientEntry {
                header,
                encrypted_key: decode_segment("encrypted_key", encrypted_key)?,
            }],
            ciphertext: CipherText::from_parts(
                decode_segment("ciphertext", ciphertext)?,
                decode_segment("iv", iv)?,
                decode_segment("tag", tag)?,
            ),
            plaintext: Mutex::new(None),
        })
    }

    fn from_json(jwe: JweJson) -> Result<Self> {
        if jwe.recipients.is_empty() {
            return Err(JoseError::MalformedObject("JWE has no recipients".into()));
        }
        let protected = Header::decode(&jwe.protected)?;
        let mut recipients = Vec::with_capacity(jwe.recipients.len());
        for recipient in jwe.recipients {
            recipients.push(RecipientEntry {
                header: merge(&[&protected, &jwe.unprotected, &recipient.header])?,
                encrypted_key: decode_segment("encrypted_key", &recipient.encrypted_key)?,
            });
        }
        if let Some(aad) = &jwe.aad {
            decode_segment("aad", aad)?;
        }
        Ok(Self {
            protected_segment: jwe.protected,
            aad_segment: jwe.aad,
            recipients,
            ciphertext: CipherText::from_parts(
                decode_segment("ciphertext", &jwe.ciphertext)?,
                decode_segment("iv", &jwe.iv)?,
                decode_segment("tag", &jwe.tag)?,
            ),
            plaintext: Mutex::new(None),
        })
    }

    pub fn headers(&self) -> Vec<&Header> {
        self.recipients.iter().map(|entry| &entry.header).collect()
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    pub fn ciphertext(&self) -> &CipherText {
        &self.ciphertext
    }

    pub fn content_type(&self) -> Option<&str> {
        self.recipients.first().and_then(|entry| entry.header.get_str("cty"))
    }

    pub fn is_nested(&self) -> bool {
        self.content_type().is_some_and(is_nested_content_type)
    }

    /// Whether the single recipient uses the key directly (`alg: "dir"`).
    pub fn is_direct(&self) -> bool {
        self.recipients.iter().any(|entry| entry.alg() == Some("dir"))
    }

    /// Plaintext from the most recent successful decryption. Each
    /// `decrypt` call authenticates again with its own keychain and AAD.
    pub fn plaintext(&self) -> Option<Vec<u8>> {
        self.plaintext.lock().clone()
    }

    /// Decrypted plaintext parsed as JSON.
    pub fn claims(&self) -> Result<Value> {
        let plaintext = self
            .plaintext()
            .ok_or_else(|| JoseError::MalformedPayload("JWE has not been decrypted".into()))?;
        serde_json::from_slice(&plaintext).map_err(|e| JoseError::MalformedPayload(e.to_string()))
    }

    /// Decrypt with the first recipient whose key the keychain holds.
    pub async fn decrypt(&self, keychain: &Keychain) -> Result<Vec<u8>> {
        let additional = aad_input(&self.protected_segment, self.aad_segment.as_deref());
        self.decrypt_inner(keychain, &additional).await
    }

    /// Decrypt with additional authenticated data supplied out of band
    /// instead of the object's `aad` member.
    pub async fn decrypt_with_aad(&self, keychain: &Keychain, aad: &[u8]) -> Result<Vec<u8>> {
        let segment = base64url_encode(aad);
        let additional = aad_input(&self.protected_segment, Some(segment.as_str()));
        self.decrypt_inner(keychain, &additional).await
    }

    async fn decrypt_inner(&self, keychain: &Keychain, additional: &str) -> Result<Vec<u8>> {
        let enc = self.content_algorithm()?;
        let cek = self.recover_cek(keychain, enc).await?;
        let plaintext = cek
            .decrypt(&self.ciphertext, additional.as_bytes())
            .await
            .map_err(content_undecryptable)?
            .to_vec();
        *self.plaintext.lock() = Some(plaintext.clone());
        Ok(plaintext)
    }

    fn content_algorithm(&self) -> Result<Algorithm> {
        let enc = self
            .recipients
            .first()
            .and_then(|entry| entry.header.get_str("enc"))
            .ok_or(JoseError::MissingProtectedClaim("enc"))?;
        let enc = Algorithm::from_name(enc)?;
        if !enc.is_content_encryption() {
            return Err(JoseError::MalformedHeader(format!(
                "{} is not a content encryption algorithm",
                enc
            )));
        }
        Ok(enc)
    }

    async fn recover_cek(&self, keychain: &Keychain, enc: Algorithm) -> Result<ContentEncryptionKey> {
        if self.is_direct() {
            let [recipient] = self.recipients.as_slice() else {
                return Err(JoseError::MalformedObject(
                    "direct encryption with more than one recipient".into(),
                ));
            };
            let key = match recipient.kid() {
                Some(kid) => keychain.find(kid).filter(|key| key.algorithm() == enc),
                None => keychain
                    .iter()
                    .find(|key| key.algorithm() == enc && key.can_decrypt()),
            }
            .ok_or_else(no_key)?;
            tracing::debug!(kid = ?key.kid(), enc = %enc, "direct decryption");
            return Ok(ContentEncryptionKey::direct(key.clone())?);
        }

        let cipher = enc.content_cipher().ok_or_else(|| {
            JoseError::MalformedHeader(format!("{} is not a content encryption algorithm", enc))
        })?;
        for recipient in &self.recipients {
            let alg = recipient
                .alg()
                .ok_or(JoseError::MissingProtectedClaim("alg"))?;
            let alg = Algorithm::from_name(alg)?;
            let candidates: Vec<&KeySpecification> = match recipient.kid() {
                Some(kid) => keychain.find(kid).into_iter().collect(),
                None => keychain
                    .iter()
                    .filter(|key| key.algorithm() == alg && key.can_unwrap())
                    .collect(),
            };

            for key in candidates {
                if key.algorithm() != alg {
                    continue;
                }
                let wrapped = recipient.wrapped_key()?;
                match key.unwrap(&wrapped).await {
                    Ok(bytes) => {
                        tracing::debug!(kid = ?key.kid(), alg = %alg, "content key unwrapped");
                        return ContentEncryptionKey::from_bytes(cipher, bytes).map_err(undecryptable);
                    }
                    Err(err) if recipient.kid().is_some() => return Err(undecryptable(err)),
                    Err(err) => {
                        tracing::debug!(kid = ?key.kid(), error = %err, "candidate key failed to unwrap");
                    }
                }
            }
        }
        Err(no_key())
    }
}

fn no_key() -> JoseError {
    JoseError::MalformedPayload("no key could be found".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_count_is_checked() {
        for token in ["a.b", "a.b.c.d", "a.b.c.d.e.f"] {
            assert!(matches!(
                JoseObject::parse(token),
                Err(JoseError::MalformedObject(_))
            ));
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(JoseObject::parse("not a token"), Err(JoseError::MalformedObject(_))));
        assert!(matches!(JoseObject::parse("{\"payload\""), Err(JoseError::MalformedObject(_))));
        assert!(matches!(JoseObject::parse(vec![0xffu8, 0xfe]), Err(JoseError::MalformedObject(_))));
    }

    #[test]
    fn compact_jws_shape() {
        let protected = Header::new().with("alg", "HS256").with("cty", "JOSE").encode().unwrap();
        let token = format!("{}.{}.{}", protected, base64url_encode(b"inner"), base64url_encode(b"sig"));
        let object = JoseObject::parse(&token).unwrap();
        let jws = object.as_signed().unwrap();
        assert_eq!(jws.payload(), b"inner");
        assert_eq!(jws.signature_count(), 1);
        assert!(object.is_nested());
        assert!(!object.is_jwt());
    }

    #[test]
    fn base64url_wrapped_json_is_accepted() {
        let json = serde_json::json!({
            "payload": base64url_encode(b"{}"),
            "signatures": [{"protected": Header::new().with("alg", "HS256").encode().unwrap(), "signature": "c2ln"}],
        });
        let wrapped = base64url_encode(json.to_string().as_bytes());
        assert!(JoseObject::parse(wrapped).unwrap().is_signed());
    }

    #[test]
    fn overlapping_headers_fail_parsing() {
        let protected = Header::new().with("alg", "HS256").encode().unwrap();
        let json = serde_json::json!({
            "payload": base64url_encode(b"{}"),
            "protected": protected,
            "header": {"alg": "HS256"},
            "signature": "c2ln",
        });
        assert!(matches!(
            JoseObject::parse(json.to_string()),
            Err(JoseError::MalformedHeader(_))
        ));
    }

    #[test]
    fn media_types() {
        assert!(is_nested_content_type("jwt"));
        assert!(is_nested_content_type("application/jose+json"));
        assert!(!is_nested_content_type("application/json"));
    }
}
