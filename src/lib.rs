//! sigil-registry - a deterministic merge/seal registry for sigil tokens
//!
//! Tokens are canonicalized, deduplicated by canonical form, ordered by
//! their domain moment, and sealed with a content hash that any client can
//! use to tell whether its view is current.

pub mod cli;
pub mod clock;
pub mod http_server;
pub mod lineage;
pub mod merge;
pub mod observability;
pub mod registry;
pub mod token;
