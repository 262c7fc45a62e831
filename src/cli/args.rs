//! CLI argument definitions using clap
//!
//! Commands:
//! - sigil-registry serve  --config <path> [--port <port>]
//! - sigil-registry seal   --config <path>
//! - sigil-registry list   --config <path> [--offset <n>] [--limit <n>]
//! - sigil-registry inhale --config <path> --file <json>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::config::DEFAULT_CONFIG_PATH;

/// Sigil registry - dedupe, order and seal shareable tokens
#[derive(Parser, Debug)]
#[command(name = "sigil-registry")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the seal of the persisted registry
    Seal {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print one page of registry URLs
    List {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Page size (defaults to the configured page limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Merge a records file or krystal document into the persisted registry
    Inhale {
        /// Path to configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// JSON file: `{"records": [...]}`, a records array, or any krystal document
        #[arg(long)]
        file: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
