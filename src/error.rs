// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types for the storage engine.
//!
//! None of these cross the public `StorageEngine` API: every public method
//! absorbs them, logs them and bumps the error counter. They exist so the
//! internal steps can use `?` and so logs carry a precise cause.

use crate::storage::TierKind;

/// Error returned by a single storage tier.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    /// The tier refused the write because its byte quota would be exceeded.
    #[error("quota exceeded: {used} of {quota} bytes in use, write needs {requested}")]
    QuotaExceeded {
        used: usize,
        quota: usize,
        requested: usize,
    },

    /// The tier cannot be used at all (disabled, closed, I/O failure).
    #[error("tier unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl TierError {
    pub fn is_quota(&self) -> bool {
        matches!(self, TierError::QuotaExceeded { .. })
    }
}

pub type TierResult<T> = Result<T, TierError>;

/// Failure while applying or reversing a value transform.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("malformed run-length payload at offset {0}")]
    RunLength(usize),

    #[error("decoded payload is not valid UTF-8")]
    Utf8,
}

/// Internal error taxonomy of the engine.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A single item is larger than the per-item ceiling.
    #[error("item `{key}` is {size} bytes, limit is {limit}")]
    SizeExceeded {
        key: String,
        size: usize,
        limit: usize,
    },

    /// A tier rejected a write because of its aggregate quota.
    #[error("{tier} tier quota exceeded for `{key}`")]
    QuotaExceeded { tier: TierKind, key: String },

    /// Encryption/compression layer could not be reversed.
    #[error("transform error on `{key}`: {source}")]
    Transform {
        key: String,
        #[source]
        source: CodecError,
    },

    /// Logical type reconstruction failed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A tier was found unusable.
    #[error("{tier} tier unavailable: {reason}")]
    TierUnavailable { tier: TierKind, reason: String },

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("backup error: {0}")]
    Backup(String),

    #[error(transparent)]
    Tier(#[from] TierError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_errors_are_detected() {
        let quota = TierError::QuotaExceeded {
            used: 10,
            quota: 12,
            requested: 5,
        };
        assert!(quota.is_quota());
        assert!(!TierError::Unavailable("disabled".into()).is_quota());
    }

    #[test]
    fn messages_name_the_offending_item() {
        let err = StorageError::SizeExceeded {
            key: "wallet_history".to_string(),
            size: 2_000_000,
            limit: 1_048_576,
        };
        assert_eq!(
            err.to_string(),
            "item `wallet_history` is 2000000 bytes, limit is 1048576"
        );

        let err = StorageError::TierUnavailable {
            tier: TierKind::Durable,
            reason: "probe failed".to_string(),
        };
        assert_eq!(err.to_string(), "durable tier unavailable: probe failed");
    }

    #[test]
    fn tier_errors_convert_transparently() {
        let err: StorageError = TierError::Backend("disk full".into()).into();
        assert_eq!(err.to_string(), "backend error: disk full");
    }
}
