//! The encoder: builds a signed and/or encrypted object and serializes it.

use ckms_core::{
    Algorithm, ContentEncryptionKey, KeyError, KeyOperation, KeySpecification, WrappedKey,
};
use ckms_crypto::base64url_encode;
use futures::future::try_join_all;
use serde::Serialize;

use crate::error::{JoseError, Result};
use crate::header::{check_disjoint, merge, Header};
use crate::wire::{aad_input, JweJson, JwsJson, RecipientJson, SignatureJson};

/// Content encryption used when none is chosen.
pub const DEFAULT_ENCRYPTION: Algorithm = Algorithm::A256Gcm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serialization {
    /// Dot-separated segments.
    #[default]
    Compact,
    /// JSON with the single signature or recipient lifted to the top level.
    Flattened,
    /// JSON with `signatures` / `recipients` arrays.
    General,
}

#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    pub serialization: Serialization,
    /// Additional authenticated data for the JWE `aad` member.
    pub aad: Option<Vec<u8>>,
    /// Extra protected parameters for the outermost layer.
    pub protected: Header,
    /// Shared unprotected JWE header.
    pub unprotected: Header,
}

impl SerializeOptions {
    pub fn compact() -> Self {
        Self::default()
    }

    pub fn flattened() -> Self {
        Self {
            serialization: Serialization::Flattened,
            ..Self::default()
        }
    }

    pub fn general() -> Self {
        Self {
            serialization: Serialization::General,
            ..Self::default()
        }
    }

    pub fn with_aad(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.aad = Some(aad.into());
        self
    }

    pub fn with_protected(mut self, protected: Header) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_unprotected(mut self, unprotected: Header) -> Self {
        self.unprotected = unprotected;
        self
    }
}

#[derive(Debug)]
struct PendingSignature {
    signer: KeySpecification,
    protected: Header,
    header: Header,
}

#[derive(Debug)]
struct PendingRecipient {
    key: KeySpecification,
    header: Header,
    direct: bool,
}

/// A message being built. Signatures come first, then recipients;
/// [`serialize`](Self::serialize) consumes the builder.
#[derive(Debug)]
pub struct JosePayload {
    payload: Vec<u8>,
    jwt: bool,
    content_type: Option<String>,
    encryption: Algorithm,
    signatures: Vec<PendingSignature>,
    recipients: Vec<PendingRecipient>,
}

impl JosePayload {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            jwt: false,
            content_type: None,
            encryption: DEFAULT_ENCRYPTION,
            signatures: Vec::new(),
            recipients: Vec::new(),
        }
    }

    /// A JSON Web Token carrying `claims`.
    pub fn jwt<T: Serialize + ?Sized>(claims: &T) -> Result<Self> {
        let mut payload = Self::new(serde_json::to_vec(claims)?);
        payload.jwt = true;
        Ok(payload)
    }

    /// Declare the `cty` of a non-JWT payload.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Choose the `enc` algorithm. Direct recipients override it with
    /// their own algorithm.
    pub fn with_encryption(mut self, enc: Algorithm) -> Result<Self> {
        if !enc.is_content_encryption() {
            return Err(JoseError::Serialization(format!(
                "{} is not a content encryption algorithm",
                enc
            )));
        }
        self.encryption = enc;
        Ok(self)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_jwt(&self) -> bool {
        self.jwt
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty()
    }

    pub fn is_encrypted(&self) -> bool {
        !self.recipients.is_empty()
    }

    /// Queue a signature by `signer`. `alg` and `kid` default from the key,
    /// `typ`/`cty` from the payload kind.
    pub fn add_signature(
        &mut self,
        signer: &KeySpecification,
        protected: Option<Header>,
        header: Option<Header>,
    ) -> Result<&mut Self> {
        if self.is_encrypted() {
            return Err(JoseError::SignAfterEncrypt);
        }
        if !signer.can_sign() {
            return Err(KeyError::ForbiddenOperation {
                operation: KeyOperation::Sign,
                kid: signer.kid().unwrap_or("<unloaded>").to_string(),
            }
            .into());
        }
        let kid = signer.kid().ok_or(KeyError::NotLoaded)?;

        let mut protected = protected.unwrap_or_default();
        let header = header.unwrap_or_default();
        check_disjoint(&[&protected, &header])?;
        let declared = protected.get_str("alg").or_else(|| header.get_str("alg"));
        if declared.is_some_and(|alg| alg != signer.algorithm().name()) {
            return Err(JoseError::MalformedHeader(format!(
                "alg does not match the {} signing key",
                signer.algorithm()
            )));
        }

        protected.insert_default(&[&header], "alg", signer.algorithm().name());
        protected.insert_default(&[&header], "kid", kid);
        if self.jwt {
            protected.insert_default(&[&header], "typ", "JWT");
        } else if let Some(cty) = &self.content_type {
            protected.insert_default(&[&header], "cty", cty.as_str());
        }

        self.signatures.push(PendingSignature {
            signer: signer.clone(),
            protected,
            header,
        });
        Ok(self)
    }

    /// Queue a recipient. With `direct`, the recipient key itself encrypts
    /// the content (`alg: "dir"`) and must be the only recipient.
    pub fn add_recipient(
        &mut self,
        encrypter: &KeySpecification,
        header: Option<Header>,
        direct: bool,
    ) -> Result<&mut Self> {
        if (direct && self.is_encrypted()) || self.recipients.iter().any(|r| r.direct) {
            return Err(JoseError::DirectRecipient);
        }
        let capable = if direct {
            encrypter.algorithm().is_content_encryption() && encrypter.can_encrypt()
        } else {
            encrypter.can_wrap()
        };
        if !capable {
            return Err(JoseError::CannotEncrypt(
                encrypter.kid().unwrap_or("<unloaded>").to_string(),
            ));
        }
        encrypter.kid().ok_or(KeyError::NotLoaded)?;

        self.recipients.push(PendingRecipient {
            key: encrypter.clone(),
            header: header.unwrap_or_default(),
            direct,
        });
        Ok(self)
    }

    /// Sign, then encrypt, then render.
    pub async fn serialize(self, options: SerializeOptions) -> Result<String> {
        self.validate(&options)?;

        if !self.is_encrypted() {
            let jws = self.sign(&options.protected).await?;
            return render_jws(jws, options.serialization);
        }

        let (content, cty) = if self.is_signed() {
            let form = self.inner_form(options.serialization);
            let inner = render_jws(self.sign(&Header::new()).await?, form)?;
            let cty = match (self.jwt, form) {
                (true, _) => "JWT",
                (false, Serialization::Compact) => "JOSE",
                (false, _) => "JOSE+JSON",
            };
            (inner.into_bytes(), Some(cty.to_string()))
        } else {
            (self.payload.clone(), self.content_type.clone())
        };
        self.encrypt(&content, cty, options).await
    }

    fn validate(&self, options: &SerializeOptions) -> Result<()> {
        let signatures = self.signatures.len();
        let recipients = self.recipients.len();
        let fail = |msg: &str| Err(JoseError::Serialization(msg.to_string()));

        if signatures == 0 && recipients == 0 {
            return fail("payload is neither signed nor encrypted");
        }
        match options.serialization {
            Serialization::Compact => {
                if signatures > 1 || recipients > 1 {
                    return fail("compact serialization allows one signature and one recipient");
                }
                if options.aad.is_some() {
                    return fail("compact serialization cannot carry additional authenticated data");
                }
                if !options.unprotected.is_empty()
                    || self.signatures.iter().any(|s| !s.header.is_empty())
                {
                    return fail("compact serialization cannot carry unprotected headers");
                }
            }
            Serialization::Flattened => {
                if recipients > 1 || (recipients == 0 && signatures > 1) {
                    return fail("flattened serialization allows a single entry");
                }
            }
            Serialization::General => {}
        }
        if recipients == 0 && (options.aad.is_some() || !options.unprotected.is_empty()) {
            return fail("aad and shared unprotected headers require encryption");
        }
        if self.jwt
            && recipients > 0
            && (signatures > 1 || self.signatures.iter().any(|s| !s.header.is_empty()))
        {
            return fail("a nested JWT carries exactly one compact signature");
        }
        Ok(())
    }

    /// Serialization of the signed object inside a JWE. JWTs are always
    /// compact.
    fn inner_form(&self, outer: Serialization) -> Serialization {
        match outer {
            _ if self.jwt => Serialization::Compact,
            Serialization::Compact => Serialization::Compact,
            Serialization::Flattened if self.signatures.len() == 1 => Serialization::Flattened,
            _ => Serialization::General,
        }
    }

    async fn sign(&self, extra: &Header) -> Result<JwsJson> {
        let payload = base64url_encode(&self.payload);
        let signatures =
            try_join_all(self.signatures.iter().map(|pending| pending.sign(&payload, extra)))
                .await?;
        Ok(JwsJson {
            payload,
            signatures,
        })
    }

    async fn encrypt(
        &self,
        content: &[u8],
        cty: Option<String>,
        options: SerializeOptions,
    ) -> Result<String> {
        let cek = match self.recipients.first() {
            Some(recipient) if recipient.direct => {
                ContentEncryptionKey::direct(recipient.key.clone())?
            }
            _ => {
                let cipher = self.encryption.content_cipher().ok_or_else(|| {
                    JoseError::Serialization(format!("{} cannot encrypt content", self.encryption))
                })?;
                ContentEncryptionKey::generate(cipher)?
            }
        };

        let SerializeOptions {
            serialization,
            aad,
            mut protected,
            unprotected,
        } = options;
        protected.insert_default(&[&unprotected], "enc", cek.algorithm().name());
        if self.jwt {
            protected.insert_default(&[&unprotected], "typ", "JWT");
        }
        if let Some(cty) = cty {
            protected.insert_default(&[&unprotected], "cty", cty);
        }

        let mut recipients = Vec::with_capacity(self.recipients.len());
        for recipient in &self.recipients {
            let wrapped = cek.wrap_for(&recipient.key).await?;
            recipients.push(RecipientJson {
                header: recipient.header_for(&wrapped, &[&protected, &unprotected])?,
                encrypted_key: base64url_encode(&wrapped.encrypted_key),
            });
        }
        if serialization == Serialization::Compact {
            if let Some(first) = recipients.first_mut() {
                let header = std::mem::take(&mut first.header);
                protected = merge(&[&protected, &header])?;
            }
        }
        for recipient in &recipients {
            check_disjoint(&[&protected, &unprotected, &recipient.header])?;
        }

        let protected_segment = protected.encode()?;
        let aad_segment = aad.as_deref().map(base64url_encode);
        let additional = aad_input(&protected_segment, aad_segment.as_deref());
        let ciphertext = cek.encrypt(content, additional.as_bytes()).await?;
        tracing::debug!(
            enc = %cek.algorithm(),
            recipients = recipients.len(),
            direct = cek.is_direct(),
            "payload encrypted"
        );

        let iv = base64url_encode(ciphertext.iv());
        let body = base64url_encode(ciphertext.ciphertext());
        let tag = base64url_encode(ciphertext.tag());
        if serialization == Serialization::Compact {
            let encrypted_key = recipients
                .first()
                .map(|r| r.encrypted_key.clone())
                .unwrap_or_default();
            return Ok([protected_segment, encrypted_key, iv, body, tag].join("."));
        }

        let jwe = JweJson {
            protected: protected_segment,
            unprotected,
            recipients,
            aad: aad_segment,
            iv,
            ciphertext: body,
            tag,
        };
        Ok(serde_json::to_string(
            &jwe.to_value(serialization == Serialization::Flattened)?,
        )?)
    }
}

impl PendingSignature {
    async fn sign(&self, payload: &str, extra: &Header) -> Result<SignatureJson> {
        let protected = merge(&[&self.protected, extra])?;
        check_disjoint(&[&protected, &self.header])?;
        let segment = protected.encode()?;
        let signing_input = format!("{}.{}", segment, payload);
        let signature = self.signer.sign(signing_input.as_bytes()).await?;
        tracing::debug!(kid = ?self.signer.kid(), alg = %self.signer.algorithm(), "payload signed");
        Ok(SignatureJson {
            protected: segment,
            header: self.header.clone(),
            signature: base64url_encode(&signature),
        })
    }
}

impl PendingRecipient {
    /// Per-recipient header: `alg`, `kid`, plus whatever the key management
    /// algorithm produced.
    fn header_for(&self, wrapped: &WrappedKey, shared: &[&Header]) -> Result<Header> {
        let mut header = self.header.clone();
        let alg = if self.direct {
            "dir"
        } else {
            self.key.algorithm().name()
        };
        header.insert_default(shared, "alg", alg);
        if let Some(kid) = self.key.kid() {
            header.insert_default(shared, "kid", kid);
        }
        if let Some(epk) = &wrapped.epk {
            header.insert_new("epk", epk.to_jwk())?;
        }
        for (name, value) in [
            ("iv", &wrapped.iv),
            ("tag", &wrapped.tag),
            ("apu", &wrapped.apu),
            ("apv", &wrapped.apv),
        ] {
            if let Some(value) = value {
                header.insert_new(name, base64url_encode(value))?;
            }
        }
        Ok(header)
    }
}

fn render_jws(jws: JwsJson, form: Serialization) -> Result<String> {
    match form {
        Serialization::Compact => match jws.signatures.as_slice() {
            [signature] => Ok(format!(
                "{}.{}.{}",
                signature.protected, jws.payload, signature.signature
            )),
            _ => Err(JoseError::Serialization(
                "compact serialization allows one signature".into(),
            )),
        },
        Serialization::Flattened => Ok(serde_json::to_string(&jws.to_value(true)?)?),
        Serialization::General => Ok(serde_json::to_string(&jws.to_value(false)?)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn key(alg: Algorithm) -> KeySpecification {
        KeySpecification::generate(alg).into_loaded().await.unwrap()
    }

    #[tokio::test]
    async fn signing_after_encryption_is_rejected() {
        let mut payload = JosePayload::new(b"data".to_vec());
        payload
            .add_recipient(&key(Algorithm::A128Kw).await, None, false)
            .unwrap();
        let err = payload
            .add_signature(&key(Algorithm::Es256).await, None, None)
            .unwrap_err();
        assert!(matches!(err, JoseError::SignAfterEncrypt));
    }

    #[tokio::test]
    async fn direct_recipient_must_be_alone() {
        let direct = key(Algorithm::A256Gcm).await;
        let wrapping = key(Algorithm::A256Kw).await;

        let mut payload = JosePayload::new(b"data".to_vec());
        payload.add_recipient(&wrapping, None, false).unwrap();
        assert!(matches!(
            payload.add_recipient(&direct, None, true),
            Err(JoseError::DirectRecipient)
        ));

        let mut payload = JosePayload::new(b"data".to_vec());
        payload.add_recipient(&direct, None, true).unwrap();
        assert!(matches!(
            payload.add_recipient(&wrapping, None, false),
            Err(JoseError::DirectRecipient)
        ));
    }

    #[tokio::test]
    async fn recipients_must_be_able_to_encrypt() {
        let mut payload = JosePayload::new(b"data".to_vec());
        let signing = key(Algorithm::Hs256).await;
        assert!(matches!(
            payload.add_recipient(&signing, None, false),
            Err(JoseError::CannotEncrypt(_))
        ));
        let wrapping = key(Algorithm::A128Kw).await;
        assert!(matches!(
            payload.add_recipient(&wrapping, None, true),
            Err(JoseError::CannotEncrypt(_))
        ));
        assert!(!payload.is_encrypted());
    }

    #[tokio::test]
    async fn signer_must_be_able_to_sign() {
        let encryption_key = key(Algorithm::A256Gcm).await;
        let mut payload = JosePayload::new(b"data".to_vec());
        assert!(matches!(
            payload.add_signature(&encryption_key, None, None),
            Err(JoseError::Key(KeyError::ForbiddenOperation { .. }))
        ));

        let unloaded = KeySpecification::generate(Algorithm::Es256);
        assert!(matches!(
            payload.add_signature(&unloaded, None, None),
            Err(JoseError::Key(KeyError::NotLoaded))
        ));
    }

    #[tokio::test]
    async fn signature_headers_are_checked_eagerly() {
        let signer = key(Algorithm::Es256).await;
        let mut payload = JosePayload::new(b"data".to_vec());
        let protected = Header::new().with("jku", "https://keys.example");
        let header = Header::new().with("jku", "https://other.example");
        assert!(matches!(
            payload.add_signature(&signer, Some(protected), Some(header)),
            Err(JoseError::MalformedHeader(_))
        ));
        assert!(matches!(
            payload.add_signature(&signer, Some(Header::new().with("alg", "HS256")), None),
            Err(JoseError::MalformedHeader(_))
        ));
    }

    #[tokio::test]
    async fn compact_constraints() {
        let a = key(Algorithm::A128Kw).await;
        let b = key(Algorithm::A256Kw).await;

        let mut payload = JosePayload::new(b"data".to_vec());
        payload.add_recipient(&a, None, false).unwrap();
        payload.add_recipient(&b, None, false).unwrap();
        assert!(matches!(
            payload.serialize(SerializeOptions::compact()).await,
            Err(JoseError::Serialization(_))
        ));

        let mut payload = JosePayload::new(b"data".to_vec());
        payload.add_recipient(&a, None, false).unwrap();
        assert!(matches!(
            payload
                .serialize(SerializeOptions::compact().with_aad(b"extra".to_vec()))
                .await,
            Err(JoseError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn nothing_to_serialize() {
        let payload = JosePayload::new(b"data".to_vec());
        assert!(matches!(
            payload.serialize(SerializeOptions::general()).await,
            Err(JoseError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn jwt_protected_defaults() {
        let signer = key(Algorithm::Hs256).await;
        let mut payload = JosePayload::jwt(&json!({"sub": "alice"})).unwrap();
        payload.add_signature(&signer, None, None).unwrap();
        let token = payload.serialize(SerializeOptions::compact()).await.unwrap();

        let segment = token.split('.').next().unwrap();
        let protected = Header::decode(segment).unwrap();
        assert_eq!(protected.get_str("alg"), Some("HS256"));
        assert_eq!(protected.get_str("typ"), Some("JWT"));
        assert_eq!(protected.get_str("kid"), signer.kid());
    }

    #[test]
    fn encryption_must_be_a_content_algorithm() {
        assert!(JosePayload::new(Vec::new())
            .with_encryption(Algorithm::A128Kw)
            .is_err());
        assert!(JosePayload::new(Vec::new())
            .with_encryption(Algorithm::A128Gcm)
            .is_ok());
    }
}
