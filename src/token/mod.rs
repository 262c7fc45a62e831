//! Token subsystem
//!
//! A token is a shareable, self-describing URL. This module provides:
//! - [`TokenNormalizer`]: raw token → [`CanonicalToken`] (the dedupe key)
//! - [`extract_payload`]: raw token → embedded record data, when present

mod errors;
mod normalizer;
mod payload;

pub use errors::{PayloadError, TokenError, TokenResult};
pub use normalizer::{
    looks_like_bare_token, CanonicalToken, TokenNormalizer, DEFAULT_BASE_ORIGIN,
    DEFAULT_IGNORE_PARAMS,
};
pub use payload::{decode_token, extract_payload, EmbeddedPayload, MAX_DECODED_BYTES};

/// Query/fragment parameter carrying the witness chain
pub const LINEAGE_PARAM: &str = "add";
