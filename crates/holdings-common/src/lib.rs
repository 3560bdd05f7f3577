//! Holdings Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the holdings ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: Content digests for staged files and archives
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use holdings_common::checksum::{sha256_hex, verify_checksum};
//!
//! fn check(bytes: &[u8]) -> holdings_common::Result<()> {
//!     let digest = sha256_hex(bytes);
//!     verify_checksum(bytes, &digest)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{HoldingsError, Result};
