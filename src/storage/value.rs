// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Converting caller values to stored strings and back.
//!
//! Values are written as strings. The logical type is recorded in the item's
//! metadata and drives reconstruction on read. Entries without usable
//! metadata (written by older clients or by other scripts sharing the tier)
//! go through [`sniff`] instead.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Logical type of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    /// Objects and arrays.
    Object,
    Null,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueKind::String,
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Object(_) | Value::Array(_) => ValueKind::Object,
            Value::Null => ValueKind::Null,
        }
    }
}

/// Serialize a value to its stored string form.
///
/// Strings are stored verbatim, scalars by their textual form and structured
/// values as JSON.
pub fn serialize(value: &Value) -> Result<String, serde_json::Error> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value),
    }
}

/// Rebuild a value using the kind recorded at write time.
///
/// Fails with [`StorageError::Parse`] when the text does not match the kind;
/// callers fall back to the raw string.
pub fn reconstruct(raw: &str, kind: ValueKind) -> StorageResult<Value> {
    let rebuilt = match kind {
        ValueKind::String => Some(Value::String(raw.to_string())),
        ValueKind::Null => Some(Value::Null),
        ValueKind::Boolean => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ValueKind::Number => match serde_json::from_str::<Value>(raw) {
            Ok(number @ Value::Number(_)) => Some(number),
            _ => None,
        },
        ValueKind::Object => match serde_json::from_str::<Value>(raw) {
            Ok(structured @ (Value::Object(_) | Value::Array(_))) => Some(structured),
            _ => None,
        },
    };
    rebuilt.ok_or_else(|| {
        StorageError::Parse(format!(
            "{} byte payload is not a valid {kind:?}",
            raw.len()
        ))
    })
}

/// Best-effort type detection for entries without metadata.
pub fn sniff(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "undefined" => return Value::Null,
        _ => {}
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(raw.to_string());
    }

    let looks_numeric = trimmed
        .chars()
        .next()
        .is_some_and(|c| c == '-' || c.is_ascii_digit());
    let looks_structured = trimmed.starts_with('{') || trimmed.starts_with('[');

    if looks_numeric || looks_structured {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            if parsed.is_number() || parsed.is_object() || parsed.is_array() {
                return parsed;
            }
        }
    }

    Value::String(raw.to_string())
}
