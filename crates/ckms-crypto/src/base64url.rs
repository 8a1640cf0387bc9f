//! Unpadded Base64URL (RFC 7515 §2), the encoding of every JOSE segment.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::de::DeserializeOwned;

use crate::error::CryptoError;

pub fn base64url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Decode a segment. Trailing `=` is stripped first.
pub fn base64url_decode(segment: &str) -> Result<Vec<u8>, CryptoError> {
    Base64UrlUnpadded::decode_vec(segment.trim_end_matches('='))
        .map_err(|err| CryptoError::Base64Decode(err.to_string()))
}

/// Decode a segment holding JSON, such as a protected header.
pub fn base64url_decode_json<T: DeserializeOwned>(segment: &str) -> Result<T, CryptoError> {
    serde_json::from_slice(&base64url_decode(segment)?)
        .map_err(|err| CryptoError::Base64Decode(format!("segment is not json: {}", err)))
}
