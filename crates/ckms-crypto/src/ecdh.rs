//! ECDH-ES key agreement on P-256 with the JWA Concat KDF.

use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::PublicKey;

/// Sender side: agree on a KEK of `key_bits` with `recipient`, returning the
/// ephemeral public key that goes into the `epk` header.
pub fn ecdh_es_sender(
    recipient: &PublicKey,
    alg: &str,
    key_bits: u32,
) -> Result<(PublicKey, Zeroizing<Vec<u8>>), CryptoError> {
    let PublicKey::P256(recipient) = recipient else {
        return Err(CryptoError::KeyMismatch(
            "ECDH-ES requires a P-256 recipient key".into(),
        ));
    };
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let epk = p256::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    let kek = concat_kdf(shared.raw_secret_bytes().as_slice(), alg, &[], &[], key_bits);
    Ok((PublicKey::P256(epk), kek))
}

/// Receiver side: recompute the KEK from our static secret and the sender's
/// ephemeral public key.
pub fn ecdh_es_receiver(
    secret: &p256::SecretKey,
    epk: &PublicKey,
    alg: &str,
    apu: &[u8],
    apv: &[u8],
    key_bits: u32,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let PublicKey::P256(epk) = epk else {
        return Err(CryptoError::KeyMismatch("epk is not a P-256 key".into()));
    };
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), epk.as_affine());
    Ok(concat_kdf(
        shared.raw_secret_bytes().as_slice(),
        alg,
        apu,
        apv,
        key_bits,
    ))
}

/// Concat KDF (NIST SP 800-56A) with SHA-256:
///
///   SHA-256(counter || Z || AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo)
///
/// Each info field is a 4-byte big-endian length followed by its bytes.
/// All JOSE key wrap sizes fit in one round.
pub fn concat_kdf(
    z: &[u8],
    alg: &str,
    apu: &[u8],
    apv: &[u8],
    key_bits: u32,
) -> Zeroizing<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    for field in [alg.as_bytes(), apu, apv] {
        hasher.update((field.len() as u32).to_be_bytes());
        hasher.update(field);
    }
    hasher.update(key_bits.to_be_bytes());

    let mut output = hasher.finalize().to_vec();
    output.truncate((key_bits / 8) as usize);
    Zeroizing::new(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base64url::base64url_decode;
    use crate::keys::{Curve, KeyFamily, PrivateKey};

    #[test]
    fn sender_and_receiver_agree() {
        let recipient = PrivateKey::generate(KeyFamily::Ec(Curve::P256), 0).unwrap();
        let PrivateKey::P256(secret) = &recipient else {
            unreachable!()
        };
        let (epk, sent) =
            ecdh_es_sender(&recipient.public_key(), "ECDH-ES+A128KW", 128).unwrap();
        let received =
            ecdh_es_receiver(secret, &epk, "ECDH-ES+A128KW", &[], &[], 128).unwrap();
        assert_eq!(sent.len(), 16);
        assert_eq!(*sent, *received);
    }

    #[test]
    fn kdf_output_length_follows_key_bits() {
        let z = [7u8; 32];
        assert_eq!(concat_kdf(&z, "ECDH-ES+A128KW", &[], &[], 128).len(), 16);
        assert_eq!(concat_kdf(&z, "ECDH-ES+A192KW", &[], &[], 192).len(), 24);
        assert_eq!(concat_kdf(&z, "ECDH-ES+A256KW", &[], &[], 256).len(), 32);
    }

    #[test]
    fn kdf_binds_algorithm_id() {
        let z = [7u8; 32];
        let a = concat_kdf(&z, "ECDH-ES+A256KW", &[], &[], 256);
        let b = concat_kdf(&z, "A256GCM", &[], &[], 256);
        assert_ne!(*a, *b);
    }

    // RFC 7518 Appendix C
    #[test]
    fn kdf_rfc7518_vector() {
        let z: [u8; 32] = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let apu = base64url_decode("QWxpY2U").unwrap();
        let apv = base64url_decode("Qm9i").unwrap();
        let key = concat_kdf(&z, "A128GCM", &apu, &apv, 128);
        assert_eq!(
            key.as_slice(),
            &[86, 170, 141, 234, 248, 35, 109, 32, 92, 34, 40, 205, 113, 167, 16, 26]
        );
    }

    #[test]
    fn rejects_non_p256_recipient() {
        let key = PrivateKey::generate(KeyFamily::Okp(Curve::Ed25519), 0).unwrap();
        assert!(ecdh_es_sender(&key.public_key(), "ECDH-ES+A256KW", 256).is_err());
    }
}
