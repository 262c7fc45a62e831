//! CLI command implementations
//!
//! `serve` boots the registry and runs the HTTP server. `seal`, `list` and
//! `inhale` open the persisted registry directly, do one thing, print one
//! JSON object and exit. They must not run against a state file that a
//! live server is also writing.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use super::args::Command;
use super::config::Config;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, write_error, write_response};
use crate::http_server::{HttpServer, SigilState};
use crate::merge::RecordBatch;
use crate::observability::{log_event, log_event_with_fields, Event, MetricsRegistry};
use crate::registry::{InhaleReport, RegistryStore};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let result = match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Seal { config } => seal(&config),
        Command::List {
            config,
            offset,
            limit,
        } => list(&config, offset, limit),
        Command::Inhale { config, file } => inhale(&config, &file),
    };

    if let Err(ref e) = result {
        // Best effort; the caller still reports the error on stderr.
        let _ = write_error(e.code_str(), e.message());
    }
    result
}

/// Boot the registry and serve HTTP until Ctrl-C
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    log_event(Event::BootStart);

    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("config_path", &config_path.display().to_string()),
            ("state_path", &config.state_path),
        ],
    );

    let store = open_store(&config)?;
    let state = Arc::new(SigilState::new(Arc::new(store), config.listing_limits()));
    let server = HttpServer::with_config(config.http.clone(), state);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;

    rt.block_on(async {
        server
            .start()
            .await
            .map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
    })?;

    Ok(())
}

/// Print the seal of the persisted registry
pub fn seal(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let store = open_store(&config)?;
    let current = store.current()?;

    write_response(json!({
        "seal": current.seal().to_hex(),
        "total": current.len(),
    }))
}

/// Print one page of URLs in canonical order
pub fn list(config_path: &Path, offset: usize, limit: Option<usize>) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let limits = config.listing_limits();
    let limit = match limit {
        Some(0) => return Err(CliError::invalid_argument("limit must be a positive integer")),
        Some(n) => n.min(limits.max_limit),
        None => limits.default_limit,
    };

    let store = open_store(&config)?;
    let current = store.current()?;

    write_response(json!({
        "state_seal": current.seal().to_hex(),
        "total": current.len(),
        "offset": offset,
        "limit": limit,
        "urls": current.urls_page(offset, limit),
    }))
}

/// Merge a JSON file into the persisted registry
///
/// A `{"records": [...]}` document or a bare records array is merged as-is.
/// Anything else is treated as a krystal and harvested for tokens.
pub fn inhale(config_path: &Path, file: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let doc = read_json_file(file)?;
    let store = open_store(&config)?;

    let report = match serde_json::from_value::<RecordBatch>(doc.clone()) {
        Ok(batch) => store.inhale(batch.into_records())?,
        Err(_) => store.inhale_krystal(&doc)?,
    };

    write_response(report_json(&report))
}

fn open_store(config: &Config) -> CliResult<RegistryStore> {
    let metrics = Arc::new(MetricsRegistry::new());
    config.open_store(metrics).map_err(|e| {
        log_event_with_fields(
            Event::RegistryLoadFailed,
            &[("state_path", &config.state_path), ("error", e.message())],
        );
        CliError::boot_failed(format!("Failed to open registry: {}", e.message()))
    })
}

fn report_json(report: &InhaleReport) -> Value {
    let errors: Vec<Value> = report
        .rejected
        .iter()
        .map(|r| {
            json!({
                "index": r.index,
                "code": r.error.code(),
                "message": r.error.to_string(),
            })
        })
        .collect();

    json!({
        "received": report.received,
        "accepted": report.accepted,
        "rejected": report.rejected.len(),
        "applied": report.applied,
        "changed": report.changed,
        "pruned": report.pruned,
        "state_seal": report.seal.to_hex(),
        "total": report.total,
        "errors": errors,
    })
}
