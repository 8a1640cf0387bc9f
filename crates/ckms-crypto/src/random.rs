use crate::error::CryptoError;

/// Fill a fresh buffer of `len` bytes from the OS random source.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|e| CryptoError::RngFailed(e.to_string()))?;
    Ok(buf)
}
