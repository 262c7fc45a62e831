//! # Sigil Registry HTTP Server Module
//!
//! Axum transport over the registry store.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/sigils/*` - Inhale, seal, listing and state
//! - `/observability/*` - Metrics and monitoring

pub mod config;
pub mod observability_routes;
pub mod server;
pub mod sigil_routes;

pub use config::HttpServerConfig;
pub use server::HttpServer;
pub use sigil_routes::{ListingLimits, SigilState};
