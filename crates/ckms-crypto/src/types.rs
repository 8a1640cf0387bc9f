/// Nonce size for every AES-GCM use: content encryption and GCMKW.
pub const AES_GCM_IV_LENGTH: usize = 12;

/// Full-length GCM tag; truncated tags are rejected.
pub const AES_GCM_TAG_LENGTH: usize = 16;

/// RFC 3394 integrity block prepended by AES-KW.
pub const AES_KW_OVERHEAD: usize = 8;
