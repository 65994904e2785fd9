//! Error types for the Spanlab library.
//!
//! All fallible operations return [`SpanlabError`] through the crate-wide
//! [`Result`] alias. Position iterators only ever fail on I/O (reading
//! postings or payloads); violated preconditions that can be checked cheaply
//! are rejected when an iterator or query node is constructed.
//!
//! # Examples
//!
//! ```
//! use spanlab::error::{Result, SpanlabError};
//!
//! fn check_bounds(min: u32, max: u32) -> Result<()> {
//!     if min > max {
//!         return Err(SpanlabError::invalid_argument("min > max"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_bounds(2, 1).is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Spanlab operations.
#[derive(Error, Debug)]
pub enum SpanlabError {
    /// I/O errors while reading postings, payloads or forward index values.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A precondition of an operator was violated (wrong clause count,
    /// unsorted input where sorted input is required, invalid bounds, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is intentionally not supported by this node.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A relation or tag payload was missing or malformed.
    #[error("Payload error: {0}")]
    Payload(String),

    /// The query tree is malformed.
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SpanlabError.
pub type Result<T> = std::result::Result<T, SpanlabError>;

impl SpanlabError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SpanlabError::InvalidArgument(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        SpanlabError::Unsupported(msg.into())
    }

    /// Create a new payload error.
    pub fn payload<S: Into<String>>(msg: S) -> Self {
        SpanlabError::Payload(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        SpanlabError::Query(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SpanlabError::Config(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SpanlabError::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SpanlabError::invalid_argument("min > max");
        assert_eq!(error.to_string(), "Invalid argument: min > max");

        let error = SpanlabError::payload("truncated VInt");
        assert_eq!(error.to_string(), "Payload error: truncated VInt");

        let error = SpanlabError::unsupported("serialize plain span");
        assert_eq!(
            error.to_string(),
            "Unsupported operation: serialize plain span"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "payload ended");
        let error = SpanlabError::from(io_error);

        match error {
            SpanlabError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
