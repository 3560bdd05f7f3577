//! Checksum utilities for content verification

use crate::error::{HoldingsError, Result};
use sha2::{Digest, Sha256};

/// SHA-256 of an in-memory buffer, hex encoded
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verify that `data` hashes to `expected` (hex, either case)
pub fn verify_checksum(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(HoldingsError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
