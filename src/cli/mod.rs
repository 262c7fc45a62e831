//! CLI module for the sigil registry
//!
//! Provides command-line interface for:
//! - serve: Load the registry and serve HTTP
//! - seal: Print the current seal
//! - list: Print a page of URLs
//! - inhale: Merge a records file or krystal document

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{inhale, list, run, run_command, seal, serve};
pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_json_file, write_error, write_response};
