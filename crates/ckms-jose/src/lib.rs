//! JSON Web Signature and Encryption over ckms keychains.
//!
//! [`JosePayload`] builds signed and/or encrypted objects in compact,
//! flattened or general JSON form; [`JoseObject`] parses any of them and
//! decrypts or verifies with a [`Keychain`](ckms_core::Keychain).

pub mod decode;
pub mod error;
pub mod header;
pub mod object;
pub mod payload;
pub mod wire;

pub use decode::{decode, DecodeOptions, Decoded, DEFAULT_MAX_DEPTH};
pub use error::{JoseError, Result};
pub use header::{check_disjoint, merge, Header};
pub use object::{JoseObject, JweObject, JwsObject};
pub use payload::{JosePayload, SerializeOptions, Serialization, DEFAULT_ENCRYPTION};
pub use wire::{JsonObject, JweJson, JwsJson, RecipientJson, SignatureJson};
