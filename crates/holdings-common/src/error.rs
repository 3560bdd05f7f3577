//! Error types shared across the holdings workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, HoldingsError>;

/// Main error type for shared utilities
#[derive(Error, Debug)]
pub enum HoldingsError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}
