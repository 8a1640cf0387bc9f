//! JSON serializations of JWS and JWE (RFC 7515 §7.2, RFC 7516 §7.2).
//!
//! Parsing normalizes the flattened forms into the general ones; output
//! goes the other way when a flattened object is requested.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JoseError, Result};
use crate::header::Header;

/// General JWS JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsJson {
    pub payload: String,
    pub signatures: Vec<SignatureJson>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protected: String,
    #[serde(default, skip_serializing_if = "Header::is_empty")]
    pub header: Header,
    pub signature: String,
}

/// General JWE JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweJson {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protected: String,
    #[serde(default, skip_serializing_if = "Header::is_empty")]
    pub unprotected: Header,
    pub recipients: Vec<RecipientJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad: Option<String>,
    #[serde(default)]
    pub iv: String,
    pub ciphertext: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientJson {
    #[serde(default, skip_serializing_if = "Header::is_empty")]
    pub header: Header,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub encrypted_key: String,
}

/// A parsed JSON object, either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonObject {
    Jws(JwsJson),
    Jwe(JweJson),
}

const SIGNATURE_MEMBERS: [&str; 3] = ["protected", "header", "signature"];
const RECIPIENT_MEMBERS: [&str; 2] = ["header", "encrypted_key"];

impl JsonObject {
    /// Classify a JSON object, unfolding flattened forms.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut members) = value else {
            return Err(JoseError::MalformedObject(
                "JSON serialization must be an object".into(),
            ));
        };

        if members.contains_key("signature") {
            if members.contains_key("signatures") {
                return Err(JoseError::MalformedObject(
                    "both signature and signatures present".into(),
                ));
            }
            let entry = take_members(&mut members, &SIGNATURE_MEMBERS);
            members.insert("signatures".into(), Value::Array(vec![entry]));
        } else if members.contains_key("ciphertext") && !members.contains_key("recipients") {
            let entry = take_members(&mut members, &RECIPIENT_MEMBERS);
            members.insert("recipients".into(), Value::Array(vec![entry]));
        }

        let value = Value::Object(members);
        let parsed = if value.get("signatures").is_some() {
            serde_json::from_value(value).map(Self::Jws)
        } else if value.get("ciphertext").is_some() {
            serde_json::from_value(value).map(Self::Jwe)
        } else {
            return Err(JoseError::MalformedObject(
                "neither a JWS nor a JWE serialization".into(),
            ));
        };
        parsed.map_err(|e| JoseError::MalformedObject(e.to_string()))
    }
}

impl JwsJson {
    pub fn to_value(&self, flatten: bool) -> Result<Value> {
        let value = serde_json::to_value(self)?;
        if flatten {
            flatten_single(value, "signatures")
        } else {
            Ok(value)
        }
    }
}

impl JweJson {
    pub fn to_value(&self, flatten: bool) -> Result<Value> {
        let value = serde_json::to_value(self)?;
        if flatten {
            flatten_single(value, "recipients")
        } else {
            Ok(value)
        }
    }
}

/// AEAD additional data of a JWE: the protected segment, then `.` and the
/// encoded `aad` member when there is one.
pub(crate) fn aad_input(protected: &str, aad: Option<&str>) -> String {
    match aad {
        Some(aad) => format!("{}.{}", protected, aad),
        None => protected.to_string(),
    }
}

fn take_members(members: &mut Map<String, Value>, names: &[&str]) -> Value {
    let mut entry = Map::new();
    for name in names {
        if let Some(value) = members.remove(*name) {
            entry.insert((*name).to_string(), value);
        }
    }
    Value::Object(entry)
}

/// Lift the single entry of `list` into the top-level object.
fn flatten_single(value: Value, list: &str) -> Result<Value> {
    let Value::Object(mut members) = value else {
        return Err(JoseError::Serialization("expected a JSON object".into()));
    };
    let entries = match members.remove(list) {
        Some(Value::Array(entries)) if entries.len() == 1 => entries,
        _ => {
            return Err(JoseError::Serialization(format!(
                "flattened serialization needs exactly one entry in {}",
                list
            )))
        }
    };
    for entry in entries {
        if let Value::Object(entry) = entry {
            members.extend(entry);
        }
    }
    Ok(Value::Object(members))
}
