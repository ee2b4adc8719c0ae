// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content digests: the dedup key and a streaming hasher

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Digest length in bytes (SHA-256).
pub const KEY_LEN: usize = 32;

/// Errors from parsing a checksum key
#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("checksum must be {expected} hex chars, got {0}", expected = KEY_LEN * 2)]
    BadLength(usize),
    #[error("invalid hex at offset {0}")]
    BadHex(usize),
}

/// Fixed-length content digest used as the dedup key.
///
/// Equality is byte-wise. Two distinct contents hashing to the same key are
/// a collision; the index reports that through the error channel and refuses
/// the insert, it never aborts the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChecksumKey([u8; KEY_LEN]);

impl ChecksumKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(KEY_LEN * 2);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    pub fn from_hex(s: &str) -> Result<Self, ChecksumError> {
        if s.len() != KEY_LEN * 2 {
            return Err(ChecksumError::BadLength(s.len()));
        }
        let mut bytes = [0u8; KEY_LEN];
        for (i, chunk) in s.as_bytes().chunks_exact(2).enumerate() {
            let hi = hex_val(chunk[0]).ok_or(ChecksumError::BadHex(i * 2))?;
            let lo = hex_val(chunk[1]).ok_or(ChecksumError::BadHex(i * 2 + 1))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    /// Digest a complete in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ChecksumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChecksumKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumKey({self})")
    }
}

impl Serialize for ChecksumKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChecksumKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Streaming SHA-256 wrapper used by the copy engine.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> ChecksumKey {
        let digest = self.0.finalize();
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        ChecksumKey(bytes)
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod tests;
