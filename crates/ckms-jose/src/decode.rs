//! One-shot decoding through every nested layer.

use ckms_core::Keychain;
use serde_json::Value;

use crate::error::{JoseError, Result};
use crate::object::JoseObject;

/// Layers followed before a token is rejected as malformed.
pub const DEFAULT_MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Signatures must name their key with `kid`.
    pub require_kid: bool,
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            require_kid: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    /// Try every suitable key for signatures without a `kid`.
    pub fn allow_missing_kid(mut self) -> Self {
        self.require_kid = false;
        self
    }
}

/// The innermost payload and what was peeled off to reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub payload: Vec<u8>,
    pub content_type: Option<String>,
    pub jwt: bool,
    pub signed: bool,
    pub encrypted: bool,
}

impl Decoded {
    pub fn claims(&self) -> Result<Value> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| JoseError::MalformedPayload(e.to_string()))
    }
}

/// Parse `token`, decrypting and verifying every layer with `keychain`.
/// A signature that does not verify is `InvalidSignature`.
pub async fn decode(
    token: impl AsRef<[u8]>,
    keychain: &Keychain,
    options: DecodeOptions,
) -> Result<Decoded> {
    let mut current = token.as_ref().to_vec();
    let mut decoded = Decoded::default();

    for depth in 0..options.max_depth {
        let object = JoseObject::parse(&current)?;
        decoded.jwt |= object.is_jwt();

        let payload = match &object {
            JoseObject::Encrypted(jwe) => {
                decoded.encrypted = true;
                jwe.decrypt(keychain).await?
            }
            JoseObject::Signed(jws) => {
                decoded.signed = true;
                if !jws.verify(keychain, options.require_kid).await? {
                    return Err(JoseError::InvalidSignature);
                }
                jws.payload().to_vec()
            }
        };

        if !object.is_nested() {
            decoded.content_type = object.content_type().map(str::to_string);
            decoded.payload = payload;
            return Ok(decoded);
        }
        tracing::trace!(depth, "descending into nested JOSE object");
        current = payload;
    }

    Err(JoseError::MalformedObject(format!(
        "nesting exceeds {} layers",
        options.max_depth
    )))
}
