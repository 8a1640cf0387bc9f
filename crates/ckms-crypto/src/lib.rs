pub mod aead;
pub mod base64url;
pub mod canonical;
pub mod digest;
pub mod ecdh;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod keywrap;
pub mod random;
pub mod signing;
pub mod types;

pub use aead::{ContentCipher, Sealed};
pub use base64url::{base64url_decode, base64url_decode_json, base64url_encode};
pub use canonical::canonical_json;
pub use digest::{sha3_256, DigestAlgorithm};
pub use ecdh::{concat_kdf, ecdh_es_receiver, ecdh_es_sender};
pub use encryption::{rsa_oaep_decrypt, rsa_oaep_encrypt};
pub use error::CryptoError;
pub use keys::{Curve, KeyFamily, PrivateKey, PublicComponents, PublicKey};
pub use keywrap::{aes_kw_unwrap, aes_kw_wrap, gcm_kw_unwrap, gcm_kw_wrap};
pub use random::random_bytes;
pub use signing::{hmac_sign, hmac_verify, sign, verify, SignatureScheme};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
pub use types::{AES_GCM_IV_LENGTH, AES_GCM_TAG_LENGTH, AES_KW_OVERHEAD};
