// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Value transforms applied between the caller's serialized value and the
//! string that actually lands in a tier.
//!
//! ## Wire Format
//!
//! ```text
//! __COMPRESSED__:<base64(lz4 block, size prepended)>
//! __COMPRESSED_RLE__:<run-length encoded text>
//! __ENC__:<base64(xor stream)>
//! ```
//!
//! When both layers are applied the compression marker is outermost:
//! `__COMPRESSED__:` wraps `__ENC__:...`.
//!
//! ## Security Note
//!
//! The cipher is a XOR stream keyed by a constant salt plus the item key. The
//! salt ships in the binary, so this is obfuscation against casual inspection
//! of the storage file, not confidentiality.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Prefix of an encrypted payload.
pub const ENC_MARKER: &str = "__ENC__:";

/// Prefix of an LZ4-compressed payload.
pub const COMPRESSED_MARKER: &str = "__COMPRESSED__:";

/// Prefix of a run-length compressed payload.
pub const RLE_MARKER: &str = "__COMPRESSED_RLE__:";

/// Constant mixed into every per-item keystream.
const CIPHER_SALT: &str = "WINIX_STORAGE_SALT_v1";

/// Escape character introducing a run in the RLE scheme.
const RLE_ESCAPE: char = '~';

/// Shortest run worth encoding.
const RLE_MIN_RUN: usize = 4;

/// Upper bound on a single decoded run, guards against hostile payloads.
const RLE_MAX_RUN: usize = 1 << 24;

/// Compression algorithms available to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionScheme {
    /// LZ4 block compression, base64 wrapped.
    #[default]
    Lz4,
    /// Character run-length encoding. Fallback when LZ4 does not pay off.
    RunLength,
}

/// One reversible step of the write pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Encrypt,
    Compress(CompressionScheme),
}

impl Transform {
    pub fn marker(&self) -> &'static str {
        match self {
            Transform::Encrypt => ENC_MARKER,
            Transform::Compress(CompressionScheme::Lz4) => COMPRESSED_MARKER,
            Transform::Compress(CompressionScheme::RunLength) => RLE_MARKER,
        }
    }

    /// Compression layer present at the start of `raw`, if any.
    pub fn detect_compression(raw: &str) -> Option<Transform> {
        if raw.starts_with(RLE_MARKER) {
            Some(Transform::Compress(CompressionScheme::RunLength))
        } else if raw.starts_with(COMPRESSED_MARKER) {
            Some(Transform::Compress(CompressionScheme::Lz4))
        } else {
            None
        }
    }

    /// Apply this transform.
    ///
    /// Returns the output together with the transform that was actually used,
    /// or `None` when the step was skipped. Compression is skipped unless the
    /// output is strictly smaller; LZ4 falls back to run-length first.
    pub fn forward(&self, input: &str, key: &str) -> Option<(String, Transform)> {
        match self {
            Transform::Encrypt => Some((encrypt(input, key), Transform::Encrypt)),
            Transform::Compress(scheme) => {
                let mut candidates = vec![*scheme];
                if *scheme == CompressionScheme::Lz4 {
                    candidates.push(CompressionScheme::RunLength);
                }
                candidates.into_iter().find_map(|scheme| {
                    let packed = compress(input, scheme);
                    (packed.len() < input.len()).then_some((packed, Transform::Compress(scheme)))
                })
            }
        }
    }

    /// Reverse this transform. `input` must carry this transform's marker.
    pub fn reverse(&self, input: &str, key: &str) -> Result<String, CodecError> {
        match self {
            Transform::Encrypt => decrypt(input, key),
            Transform::Compress(scheme) => decompress(input, *scheme),
        }
    }
}

/// Result of running the forward pipeline.
#[derive(Debug, Clone)]
pub struct Encoded {
    pub payload: String,
    pub applied: Vec<Transform>,
}

impl Encoded {
    pub fn encrypted(&self) -> bool {
        self.applied.contains(&Transform::Encrypt)
    }

    pub fn compressed(&self) -> bool {
        self.applied
            .iter()
            .any(|t| matches!(t, Transform::Compress(_)))
    }
}

/// Result of peeling transforms off a stored string.
#[derive(Debug)]
pub struct Decoded {
    /// Last successfully decoded form.
    pub value: String,
    /// Layers that were removed, outermost first.
    pub layers: Vec<Transform>,
    /// The layer that failed, if decoding stopped early.
    pub error: Option<CodecError>,
}

/// Apply `plan` in order, skipping steps that decline to run.
pub fn encode(input: &str, key: &str, plan: &[Transform]) -> Encoded {
    let mut payload = input.to_string();
    let mut applied = Vec::with_capacity(plan.len());
    for step in plan {
        if let Some((output, used)) = step.forward(&payload, key) {
            payload = output;
            applied.push(used);
        }
    }
    Encoded { payload, applied }
}

/// Reverse whatever layers `raw` carries: compression first, then encryption.
///
/// Only for payloads with no metadata. Markers are trusted blindly, so a
/// plain string that starts with one is misread.
///
/// A failing layer stops decoding and the last good form is returned, so the
/// stored string is never lost to a bad decode.
pub fn decode(raw: &str, key: &str) -> Decoded {
    peel(raw, key, true, true)
}

/// Reverse only the layers the item's metadata says were applied.
pub fn decode_recorded(raw: &str, key: &str, encrypted: bool, compressed: bool) -> Decoded {
    peel(raw, key, compressed, encrypted)
}

fn peel(raw: &str, key: &str, compressed: bool, encrypted: bool) -> Decoded {
    let mut value = raw.to_string();
    let mut layers = Vec::new();

    let mut steps = Vec::with_capacity(2);
    if compressed {
        steps.extend(Transform::detect_compression(&value));
    }
    if encrypted {
        steps.push(Transform::Encrypt);
    }

    for step in steps {
        if step == Transform::Encrypt && !value.starts_with(ENC_MARKER) {
            break;
        }
        match step.reverse(&value, key) {
            Ok(next) => {
                value = next;
                layers.push(step);
            }
            Err(error) => {
                return Decoded {
                    value,
                    layers,
                    error: Some(error),
                };
            }
        }
    }

    Decoded {
        value,
        layers,
        error: None,
    }
}

// =============================================================================
// Cipher
// =============================================================================

fn keystream(key: &str) -> Vec<u8> {
    format!("{CIPHER_SALT}{key}").into_bytes()
}

fn xor(data: &[u8], stream: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(stream.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

fn encrypt(plain: &str, key: &str) -> String {
    let mixed = xor(plain.as_bytes(), &keystream(key));
    format!("{ENC_MARKER}{}", Base64::encode_string(&mixed))
}

fn decrypt(input: &str, key: &str) -> Result<String, CodecError> {
    let body = input.strip_prefix(ENC_MARKER).unwrap_or(input);
    let mixed = Base64::decode_vec(body).map_err(|e| CodecError::Base64(e.to_string()))?;
    String::from_utf8(xor(&mixed, &keystream(key))).map_err(|_| CodecError::Utf8)
}

// =============================================================================
// Compression
// =============================================================================

fn compress(input: &str, scheme: CompressionScheme) -> String {
    match scheme {
        CompressionScheme::Lz4 => {
            let packed = lz4_flex::compress_prepend_size(input.as_bytes());
            format!("{COMPRESSED_MARKER}{}", Base64::encode_string(&packed))
        }
        CompressionScheme::RunLength => format!("{RLE_MARKER}{}", rle_encode(input)),
    }
}

fn decompress(input: &str, scheme: CompressionScheme) -> Result<String, CodecError> {
    match scheme {
        CompressionScheme::Lz4 => {
            let body = input.strip_prefix(COMPRESSED_MARKER).unwrap_or(input);
            let packed =
                Base64::decode_vec(body).map_err(|e| CodecError::Base64(e.to_string()))?;
            let bytes = lz4_flex::decompress_size_prepended(&packed)
                .map_err(|e| CodecError::Decompress(e.to_string()))?;
            String::from_utf8(bytes).map_err(|_| CodecError::Utf8)
        }
        CompressionScheme::RunLength => {
            rle_decode(input.strip_prefix(RLE_MARKER).unwrap_or(input))
        }
    }
}

/// Runs of `RLE_MIN_RUN` or more, and every escape character, become
/// `~<count>~<char>`. Everything else is copied through.
fn rle_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        let mut run = 1usize;
        while chars.peek() == Some(&ch) {
            chars.next();
            run += 1;
        }

        if run >= RLE_MIN_RUN || ch == RLE_ESCAPE {
            out.push(RLE_ESCAPE);
            out.push_str(&run.to_string());
            out.push(RLE_ESCAPE);
            out.push(ch);
        } else {
            out.extend(std::iter::repeat(ch).take(run));
        }
    }
    out
}

fn rle_decode(input: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(input.len() * 2);
    let mut chars = input.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch != RLE_ESCAPE {
            out.push(ch);
            continue;
        }

        let mut digits = String::new();
        loop {
            match chars.next() {
                Some((_, RLE_ESCAPE)) => break,
                Some((_, d)) if d.is_ascii_digit() => digits.push(d),
                _ => return Err(CodecError::RunLength(offset)),
            }
        }
        let run: usize = digits.parse().map_err(|_| CodecError::RunLength(offset))?;
        if run == 0 || run > RLE_MAX_RUN {
            return Err(CodecError::RunLength(offset));
        }
        let (_, repeated) = chars.next().ok_or(CodecError::RunLength(offset))?;
        out.extend(std::iter::repeat(repeated).take(run));
    }
    Ok(out)
}
