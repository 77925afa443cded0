//! # JSON Data Helpers
//!
//! Attribute data is restricted to JSON-compatible values. These helpers are
//! the single gate between script bindings and attribute storage.

use crate::script::Binding;
use crate::types::RigError;
use serde_json::Value;

/// Deep-copy a script binding into attribute-storable JSON.
///
/// Fails with [`RigError::Copy`] when the binding is a host object
/// (a module handle, a function...), which has no JSON form.
pub fn copy_json(binding: &Binding) -> Result<Value, RigError> {
    match binding {
        Binding::Value(v) => Ok(v.clone()),
        Binding::Host(h) => Err(RigError::Copy(h.to_string())),
    }
}

/// Parse text as JSON when possible, otherwise keep it as a string.
///
/// `"1"` -> `1`, `"[1, 2]"` -> `[1, 2]`, `"abc"` -> `"abc"`.
#[must_use]
pub fn smart_conversion(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Inverse of [`smart_conversion`]: JSON text without surrounding quotes.
#[must_use]
pub fn from_smart_conversion(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
