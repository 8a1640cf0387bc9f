//! In-process key material.

use async_trait::async_trait;
use ckms_crypto::{
    aes_kw_unwrap, aes_kw_wrap, base64url_decode, ecdh_es_receiver, ecdh_es_sender, gcm_kw_unwrap,
    gcm_kw_wrap, hmac_sign, hmac_verify, random_bytes, rsa_oaep_decrypt, rsa_oaep_encrypt,
    signing, PrivateKey, PublicKey, RsaPublicKey, SignatureScheme,
};
use zeroize::Zeroizing;

use crate::algorithm::Algorithm;
use crate::cek::{CipherText, WrappedKey};
use crate::config::{KeySource, LOCAL_PROVIDER};
use crate::error::{KeyError, Result};
use crate::kid::{public_key_kid, secret_kid};
use crate::provider::{KeyHandle, KeyProvider, LoadedKey, Operation, Outcome};
use crate::spec::KeySpecification;

const DEFAULT_RSA_BITS: usize = 2048;

/// Generates keys, reads PEM files and decodes inline secrets.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

#[async_trait]
impl KeyProvider for LocalProvider {
    fn name(&self) -> &str {
        LOCAL_PROVIDER
    }

    async fn load(&self, spec: &KeySpecification) -> Result<LoadedKey> {
        let alg = spec.algorithm();
        let handle = match spec.source() {
            KeySource::Generate => generate(alg, spec.size())?,
            KeySource::Path(path) => {
                tracing::debug!(path = %path.display(), "reading PEM key");
                let pem = tokio::fs::read_to_string(path).await?;
                from_pem(alg, &pem)?
            }
            KeySource::Pem(pem) => from_pem(alg, pem)?,
            KeySource::Secret(encoded) => from_secret(alg, encoded)?,
            KeySource::Kms(key_ref) => {
                return Err(KeyError::InvalidSpec(format!(
                    "the local provider cannot resolve KMS key {}",
                    key_ref
                )))
            }
        };
        let kid = handle_kid(&handle)?;
        Ok(LoadedKey::new(kid, handle))
    }

    async fn perform(
        &self,
        spec: &KeySpecification,
        key: &KeyHandle,
        operation: Operation<'_>,
    ) -> Result<Outcome> {
        perform_local(spec.algorithm(), key, operation)
    }
}

fn handle_kid(handle: &KeyHandle) -> Result<String> {
    if let Some(secret) = handle.secret() {
        return Ok(secret_kid(secret));
    }
    handle
        .public_key()
        .map(|public| public_key_kid(&public))
        .ok_or_else(|| KeyError::Unsupported("key has neither a secret nor a public half".into()))
}

fn generate(alg: Algorithm, size: Option<usize>) -> Result<KeyHandle> {
    match alg.key_family() {
        Some(family) => {
            let key = PrivateKey::generate(family, size.unwrap_or(DEFAULT_RSA_BITS))?;
            Ok(KeyHandle::Private(key))
        }
        None => {
            let len = match (size, alg.secret_len()) {
                (Some(size), Some(expected)) if requires_exact_len(alg) && size != expected => {
                    return Err(KeyError::InvalidSpec(format!(
                        "{} requires a {} byte key, got size {}",
                        alg, expected, size
                    )))
                }
                (Some(size), _) => size,
                (None, Some(expected)) => expected,
                (None, None) => {
                    return Err(KeyError::InvalidSpec(format!(
                        "cannot generate a secret for {}",
                        alg
                    )))
                }
            };
            Ok(KeyHandle::Secret(Zeroizing::new(random_bytes(len)?)))
        }
    }
}

/// AES keys have a fixed length; HMAC secrets only have a recommended one.
fn requires_exact_len(alg: Algorithm) -> bool {
    alg.kek_len().is_some() || alg.content_cipher().is_some()
}

fn from_pem(alg: Algorithm, pem: &str) -> Result<KeyHandle> {
    let family = alg.key_family().ok_or_else(|| {
        KeyError::InvalidSpec(format!("{} keys cannot be loaded from PEM", alg.key_type()))
    })?;
    match PrivateKey::from_pem(pem, family) {
        Ok(key) => Ok(KeyHandle::Private(key)),
        Err(private_err) => match PublicKey::from_pem(pem, family) {
            Ok(key) => Ok(KeyHandle::Public(key)),
            Err(_) => Err(private_err.into()),
        },
    }
}

fn from_secret(alg: Algorithm, encoded: &str) -> Result<KeyHandle> {
    if !alg.key_type().is_symmetric() {
        return Err(KeyError::InvalidSpec(format!(
            "{} keys cannot be loaded from a secret",
            alg.key_type()
        )));
    }
    let secret = Zeroizing::new(base64url_decode(encoded)?);
    if secret.is_empty() {
        return Err(KeyError::InvalidSpec("secret is empty".into()));
    }
    if let Some(expected) = alg.secret_len() {
        if requires_exact_len(alg) && secret.len() != expected {
            return Err(KeyError::InvalidSpec(format!(
                "{} requires a {} byte key, got {}",
                alg,
                expected,
                secret.len()
            )));
        }
        if secret.len() < expected {
            tracing::warn!(alg = %alg, len = secret.len(), "HMAC secret is shorter than the digest");
        }
    }
    Ok(KeyHandle::Secret(secret))
}

fn unsupported(alg: Algorithm, what: &str) -> KeyError {
    KeyError::Unsupported(format!("{} {}", alg, what))
}

/// Perform an operation with in-process material. Shared with the remote
/// provider for public-key operations it runs locally.
pub(crate) fn perform_local(
    alg: Algorithm,
    key: &KeyHandle,
    operation: Operation<'_>,
) -> Result<Outcome> {
    match operation {
        Operation::Sign { message } => sign(alg, key, message).map(Outcome::Signature),
        Operation::Verify { message, signature } => {
            verify(alg, key, message, signature).map(Outcome::Verified)
        }
        Operation::Encrypt { plaintext, aad } => {
            encrypt(alg, key, plaintext, aad).map(Outcome::Encrypted)
        }
        Operation::Decrypt { ciphertext, aad } => {
            decrypt(alg, key, ciphertext, aad).map(Outcome::Decrypted)
        }
        Operation::Wrap { key: cek } => wrap(alg, key, cek).map(Outcome::Wrapped),
        Operation::Unwrap { wrapped } => unwrap(alg, key, wrapped).map(Outcome::Unwrapped),
    }
}

fn sign(alg: Algorithm, key: &KeyHandle, message: &[u8]) -> Result<Vec<u8>> {
    let scheme = alg
        .signature_scheme()
        .ok_or_else(|| unsupported(alg, "is not a signature algorithm"))?;
    match (scheme, key) {
        (SignatureScheme::Hmac(digest), KeyHandle::Secret(secret)) => {
            Ok(hmac_sign(secret, digest, message)?)
        }
        (_, KeyHandle::Private(private)) => Ok(signing::sign(private, scheme, message)?),
        _ => Err(unsupported(alg, "signing requires private or secret material")),
    }
}

fn verify(alg: Algorithm, key: &KeyHandle, message: &[u8], signature: &[u8]) -> Result<bool> {
    let scheme = alg
        .signature_scheme()
        .ok_or_else(|| unsupported(alg, "is not a signature algorithm"))?;
    if let (SignatureScheme::Hmac(digest), KeyHandle::Secret(secret)) = (scheme, key) {
        return Ok(hmac_verify(secret, digest, message, signature));
    }
    let public = key
        .public_key()
        .ok_or_else(|| unsupported(alg, "verification requires a public key"))?;
    Ok(signing::verify(&public, scheme, message, signature))
}

fn rsa_public(alg: Algorithm, key: &KeyHandle) -> Result<RsaPublicKey> {
    match key.public_key() {
        Some(PublicKey::Rsa(public)) => Ok(public),
        _ => Err(unsupported(alg, "requires an RSA public key")),
    }
}

fn encrypt(alg: Algorithm, key: &KeyHandle, plaintext: &[u8], aad: &[u8]) -> Result<CipherText> {
    if let (Some(cipher), true) = (alg.content_cipher(), alg.is_content_encryption()) {
        let secret = key
            .secret()
            .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
        return Ok(cipher.seal(secret, plaintext, aad)?.into());
    }
    if alg == Algorithm::RsaOaep256 {
        if !aad.is_empty() {
            return Err(unsupported(alg, "cannot authenticate additional data"));
        }
        let public = rsa_public(alg, key)?;
        let blob = rsa_oaep_encrypt(&public, plaintext)?;
        return Ok(CipherText::Opaque { blob });
    }
    Err(unsupported(alg, "is not an encryption algorithm"))
}

fn decrypt(
    alg: Algorithm,
    key: &KeyHandle,
    ciphertext: &CipherText,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match (alg.content_cipher(), ciphertext) {
        (
            Some(cipher),
            CipherText::Aead {
                ciphertext,
                iv,
                tag,
            },
        ) if alg.is_content_encryption() => {
            let secret = key
                .secret()
                .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
            Ok(Zeroizing::new(cipher.open(secret, iv, ciphertext, tag, aad)?))
        }
        (_, CipherText::Opaque { blob }) if alg == Algorithm::RsaOaep256 => {
            match key.private_key() {
                Some(PrivateKey::Rsa(private)) => Ok(rsa_oaep_decrypt(private, blob)?),
                _ => Err(unsupported(alg, "decryption requires an RSA private key")),
            }
        }
        (_, CipherText::Opaque { .. }) => Err(unsupported(
            alg,
            "cannot decrypt provider-managed ciphertext locally",
        )),
        _ => Err(unsupported(alg, "is not an encryption algorithm")),
    }
}

fn wrap(alg: Algorithm, key: &KeyHandle, cek: &[u8]) -> Result<WrappedKey> {
    match alg {
        Algorithm::A128Kw | Algorithm::A192Kw | Algorithm::A256Kw => {
            let kek = key
                .secret()
                .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
            Ok(WrappedKey::new(aes_kw_wrap(kek, cek)?))
        }
        Algorithm::A128GcmKw | Algorithm::A192GcmKw | Algorithm::A256GcmKw => {
            let kek = key
                .secret()
                .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
            let sealed = gcm_kw_wrap(kek, cek)?;
            Ok(WrappedKey {
                encrypted_key: sealed.ciphertext,
                iv: Some(sealed.iv),
                tag: Some(sealed.tag),
                ..WrappedKey::default()
            })
        }
        Algorithm::RsaOaep256 => {
            let public = rsa_public(alg, key)?;
            Ok(WrappedKey::new(rsa_oaep_encrypt(&public, cek)?))
        }
        Algorithm::EcdhEsA128Kw | Algorithm::EcdhEsA192Kw | Algorithm::EcdhEsA256Kw => {
            let public = key
                .public_key()
                .ok_or_else(|| unsupported(alg, "requires a recipient public key"))?;
            let bits = kek_bits(alg)?;
            let (epk, kek) = ecdh_es_sender(&public, alg.name(), bits)?;
            Ok(WrappedKey {
                encrypted_key: aes_kw_wrap(&kek, cek)?,
                epk: Some(epk),
                ..WrappedKey::default()
            })
        }
        _ => Err(unsupported(alg, "is not a key wrapping algorithm")),
    }
}

fn unwrap(alg: Algorithm, key: &KeyHandle, wrapped: &WrappedKey) -> Result<Zeroizing<Vec<u8>>> {
    let unwrapped = match alg {
        Algorithm::A128Kw | Algorithm::A192Kw | Algorithm::A256Kw => {
            let kek = key
                .secret()
                .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
            aes_kw_unwrap(kek, &wrapped.encrypted_key)?
        }
        Algorithm::A128GcmKw | Algorithm::A192GcmKw | Algorithm::A256GcmKw => {
            let kek = key
                .secret()
                .ok_or_else(|| unsupported(alg, "requires a symmetric secret"))?;
            let (Some(iv), Some(tag)) = (&wrapped.iv, &wrapped.tag) else {
                return Err(unsupported(alg, "requires iv and tag header parameters"));
            };
            gcm_kw_unwrap(kek, iv, &wrapped.encrypted_key, tag)?
        }
        Algorithm::RsaOaep256 => match key.private_key() {
            Some(PrivateKey::Rsa(private)) => {
                return Ok(rsa_oaep_decrypt(private, &wrapped.encrypted_key)?)
            }
            _ => return Err(unsupported(alg, "unwrapping requires an RSA private key")),
        },
        Algorithm::EcdhEsA128Kw | Algorithm::EcdhEsA192Kw | Algorithm::EcdhEsA256Kw => {
            let Some(PrivateKey::P256(secret)) = key.private_key() else {
                return Err(unsupported(alg, "unwrapping requires a P-256 private key"));
            };
            let epk = wrapped
                .epk
                .as_ref()
                .ok_or_else(|| unsupported(alg, "requires an epk header parameter"))?;
            let kek = ecdh_es_receiver(
                secret,
                epk,
                alg.name(),
                wrapped.apu.as_deref().unwrap_or_default(),
                wrapped.apv.as_deref().unwrap_or_default(),
                kek_bits(alg)?,
            )?;
            aes_kw_unwrap(&kek, &wrapped.encrypted_key)?
        }
        _ => return Err(unsupported(alg, "is not a key wrapping algorithm")),
    };
    Ok(Zeroizing::new(unwrapped))
}

fn kek_bits(alg: Algorithm) -> Result<u32> {
    alg.kek_len()
        .map(|len| (len * 8) as u32)
        .ok_or_else(|| unsupported(alg, "has no key encryption key size"))
}
