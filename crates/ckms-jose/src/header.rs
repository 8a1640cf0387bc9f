//! JOSE header parameter sets and the union rules between them.

use ckms_crypto::{base64url_decode, base64url_encode, canonical_json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{JoseError, Result};

/// One set of header parameters: the protected header, the shared
/// unprotected header, or a per-signature / per-recipient header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(Map<String, Value>);

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(members) => Ok(Self(members)),
            other => Err(JoseError::MalformedHeader(format!(
                "header must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Insert unless the parameter is already set here or in `others`.
    pub(crate) fn insert_default(
        &mut self,
        others: &[&Header],
        name: &str,
        value: impl Into<Value>,
    ) {
        if !self.contains(name) && !others.iter().any(|other| other.contains(name)) {
            self.insert(name, value);
        }
    }

    /// Insert a parameter produced by a cryptographic step; it must not
    /// already be present.
    pub(crate) fn insert_new(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.contains(name) {
            return Err(JoseError::MalformedHeader(format!(
                "header parameter {} is reserved",
                name
            )));
        }
        self.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// A Base64URL-encoded binary parameter such as `iv` or `apu`.
    pub fn get_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.0.get(name) {
            None => Ok(None),
            Some(Value::String(encoded)) => base64url_decode(encoded)
                .map(Some)
                .map_err(|e| JoseError::MalformedHeader(format!("{}: {}", name, e))),
            Some(_) => Err(JoseError::MalformedHeader(format!(
                "{} must be a string",
                name
            ))),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Base64URL of the canonical JSON form, as used for protected headers.
    pub fn encode(&self) -> Result<String> {
        if self.is_empty() {
            return Ok(String::new());
        }
        let json = canonical_json(&Value::Object(self.0.clone()))
            .map_err(|e| JoseError::Serialization(e.to_string()))?;
        Ok(base64url_encode(json.as_bytes()))
    }

    /// Decode a protected header segment. The empty segment is the empty
    /// header.
    pub fn decode(segment: &str) -> Result<Self> {
        if segment.is_empty() {
            return Ok(Self::new());
        }
        let bytes = base64url_decode(segment)
            .map_err(|e| JoseError::MalformedHeader(format!("protected header: {}", e)))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| JoseError::MalformedHeader(format!("protected header: {}", e)))?;
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for Header {
    fn from(members: Map<String, Value>) -> Self {
        Self(members)
    }
}

/// Fail with `MalformedHeader` unless the parameter names of `headers` are
/// pairwise disjoint.
pub fn check_disjoint(headers: &[&Header]) -> Result<()> {
    for (i, first) in headers.iter().enumerate() {
        for second in &headers[i + 1..] {
            if let Some(name) = first.names().find(|name| second.contains(name)) {
                return Err(JoseError::MalformedHeader(format!(
                    "parameter {} appears in more than one header",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// The JOSE Header: the union of disjoint header sets.
pub fn merge(headers: &[&Header]) -> Result<Header> {
    check_disjoint(headers)?;
    let mut merged = Header::new();
    for header in headers {
        for (name, value) in header.as_map() {
            merged.insert(name.clone(), value.clone());
        }
    }
    Ok(merged)
}
