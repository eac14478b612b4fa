// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Companion record stored next to every item under `<key>_meta`.

use serde::{Deserialize, Serialize};

use super::value::ValueKind;

/// Bookkeeping for one stored item.
///
/// Stored in clear text. It decides expiry, type reconstruction and which
/// transform layers are reversed on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Write time, unix millis.
    pub timestamp: i64,
    /// Expiry time, unix millis.
    #[serde(default)]
    pub expires: Option<i64>,
    /// Logical type of the original value.
    #[serde(rename = "type")]
    pub kind: ValueKind,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub compressed: bool,
    /// Serialized size before any transform.
    #[serde(default)]
    pub size: usize,
}

impl ItemMetadata {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires.is_some_and(|expires| expires <= now_millis)
    }

    /// Parse a stored record. Corrupt records are treated as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_type_field() {
        let meta = ItemMetadata {
            timestamp: 1_000,
            expires: Some(2_000),
            kind: ValueKind::Number,
            encrypted: true,
            compressed: false,
            size: 3,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["expires"], 2_000);

        assert_eq!(ItemMetadata::parse(&json.to_string()), Some(meta));
    }

    #[test]
    fn expiry() {
        let mut meta = ItemMetadata {
            timestamp: 0,
            expires: None,
            kind: ValueKind::String,
            encrypted: false,
            compressed: false,
            size: 0,
        };
        assert!(!meta.is_expired(i64::MAX));

        meta.expires = Some(100);
        assert!(!meta.is_expired(99));
        assert!(meta.is_expired(100));
    }

    #[test]
    fn corrupt_records_are_ignored() {
        assert!(ItemMetadata::parse("not json").is_none());
        assert!(ItemMetadata::parse(r#"{"timestamp":1}"#).is_none());
        // Sparse legacy records still parse
        let legacy = ItemMetadata::parse(r#"{"timestamp":1,"type":"string"}"#).unwrap();
        assert!(!legacy.encrypted);
        assert_eq!(legacy.expires, None);
    }
}
