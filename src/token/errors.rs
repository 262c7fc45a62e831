//! Token error types

use thiserror::Error;

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

/// A raw token that cannot be normalized into a canonical identity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("token is not a valid URL: {0}")]
    Malformed(String),

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("token URL has no host")]
    MissingHost,

    #[error("invalid base origin '{origin}': {reason}")]
    InvalidBaseOrigin { origin: String, reason: String },
}

/// An embedded payload segment that does not decode to a JSON object
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is not valid base64url")]
    NotBase64,

    #[error("decoded payload too large ({0} bytes)")]
    TooLarge(usize),

    #[error("decoded payload is not UTF-8")]
    NotUtf8,

    #[error("decoded payload is not valid JSON: {0}")]
    NotJson(String),

    #[error("decoded payload must be a JSON object")]
    NotObject,
}
