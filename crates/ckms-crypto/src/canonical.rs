//! Deterministic JSON encoding.
//!
//! Object members are emitted in lexicographic key order with no
//! insignificant whitespace, so the same value always produces the same
//! bytes regardless of how the map was built.

use serde_json::Value;

use crate::error::CryptoError;

/// Sorted-key, whitespace-free JSON. Used for protected headers and
/// anything else that is hashed or signed.
pub fn canonical_json(value: &Value) -> Result<String, CryptoError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), CryptoError> {
    match value {
        Value::Number(number) => {
            if number.as_f64().map_or(true, |f| !f.is_finite()) {
                return Err(CryptoError::NonFiniteNumber);
            }
            out.push_str(&number.to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(members) => {
            let mut names: Vec<&String> = members.keys().collect();
            names.sort_unstable();
            out.push('{');
            for (i, name) in names.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(name.as_str()).to_string());
                out.push(':');
                write_value(out, &members[name])?;
            }
            out.push('}');
        }
        // null, booleans and strings already serialize canonically
        scalar => out.push_str(&scalar.to_string()),
    }
    Ok(())
}
