//! Error types for wled-types.

use thiserror::Error;

/// Errors that can occur when parsing WLED device data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The device identity string was empty or contained only separators.
    #[error("Invalid device identity: {0:?}")]
    InvalidIdentity(String),

    /// A value could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using wled-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
