//! Configuration file
//!
//! A JSON document; every field has a default, and a missing file means
//! "all defaults". Unknown fields are rejected so typos do not pass silently.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::http_server::{HttpServerConfig, ListingLimits};
use crate::lineage::DEFAULT_MAX_LINEAGE_REFS;
use crate::merge::{MergeEngine, DEFAULT_MAX_BATCH_RECORDS};
use crate::observability::MetricsRegistry;
use crate::registry::{FilePersistence, RegistryStore};
use crate::token::{TokenNormalizer, DEFAULT_BASE_ORIGIN, DEFAULT_IGNORE_PARAMS};

/// Config path used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "./sigil-registry.json";

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub http: HttpServerConfig,

    /// Origin relative and bare tokens resolve against
    #[serde(default = "default_base_origin")]
    pub base_origin: String,

    /// Registry state file
    #[serde(default = "default_state_path")]
    pub state_path: String,

    #[serde(default = "default_max_batch_records")]
    pub max_batch_records: usize,

    #[serde(default = "default_max_lineage_refs")]
    pub max_lineage_refs: usize,

    /// Page size for `/urls` when the request gives none
    #[serde(default = "default_page_limit")]
    pub default_page_limit: usize,

    /// Upper bound on a requested page size
    #[serde(default = "default_max_page_limit")]
    pub max_page_limit: usize,

    /// Largest registry an inhale response returns inline with `include_urls`
    #[serde(default = "default_max_inline_urls")]
    pub max_inline_urls: usize,

    /// Largest registry an inhale response returns inline with `include_state`
    #[serde(default = "default_max_inline_state")]
    pub max_inline_state: usize,

    /// Keep only the newest N entries (0 = unlimited)
    #[serde(default)]
    pub registry_keep: usize,

    /// Query parameters dropped during normalization; `prefix*` matches a prefix
    #[serde(default = "default_ignore_params")]
    pub ignore_params: Vec<String>,
}

fn default_base_origin() -> String {
    DEFAULT_BASE_ORIGIN.to_string()
}
fn default_state_path() -> String {
    "./sigil-registry.state.json".to_string()
}
fn default_max_batch_records() -> usize {
    DEFAULT_MAX_BATCH_RECORDS
}
fn default_max_lineage_refs() -> usize {
    DEFAULT_MAX_LINEAGE_REFS
}
fn default_page_limit() -> usize {
    10_000
}
fn default_max_page_limit() -> usize {
    200_000
}
fn default_max_inline_urls() -> usize {
    20_000
}
fn default_max_inline_state() -> usize {
    10_000
}
fn default_ignore_params() -> Vec<String> {
    DEFAULT_IGNORE_PARAMS.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpServerConfig::default(),
            base_origin: default_base_origin(),
            state_path: default_state_path(),
            max_batch_records: default_max_batch_records(),
            max_lineage_refs: default_max_lineage_refs(),
            default_page_limit: default_page_limit(),
            max_page_limit: default_max_page_limit(),
            max_inline_urls: default_max_inline_urls(),
            max_inline_state: default_max_inline_state(),
            registry_keep: 0,
            ignore_params: default_ignore_params(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> CliResult<Self> {
        let config = match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(CliError::config_error(format!(
                    "Failed to read config {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration JSON without validating it
    pub fn parse(content: &str) -> CliResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))
    }

    /// Validate limits and the base origin
    pub fn validate(&self) -> CliResult<()> {
        let positive = [
            ("max_batch_records", self.max_batch_records),
            ("max_lineage_refs", self.max_lineage_refs),
            ("default_page_limit", self.default_page_limit),
            ("max_page_limit", self.max_page_limit),
            ("http.max_body_bytes", self.http.max_body_bytes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CliError::config_error(format!("{} must be > 0", name)));
            }
        }

        if self.default_page_limit > self.max_page_limit {
            return Err(CliError::config_error(format!(
                "default_page_limit ({}) exceeds max_page_limit ({})",
                self.default_page_limit, self.max_page_limit
            )));
        }

        if self.state_path.trim().is_empty() {
            return Err(CliError::config_error("state_path must not be empty"));
        }

        self.normalizer()?;
        Ok(())
    }

    /// Token normalizer for the configured origin and ignore-list
    pub fn normalizer(&self) -> CliResult<TokenNormalizer> {
        TokenNormalizer::new(&self.base_origin, &self.ignore_params)
            .map_err(|e| CliError::config_error(e.to_string()))
    }

    pub fn merge_engine(&self) -> CliResult<MergeEngine> {
        Ok(MergeEngine::new(
            self.normalizer()?,
            self.max_lineage_refs,
            self.max_batch_records,
        ))
    }

    pub fn listing_limits(&self) -> ListingLimits {
        ListingLimits {
            default_limit: self.default_page_limit,
            max_limit: self.max_page_limit,
            max_inline_urls: self.max_inline_urls,
            max_inline_state: self.max_inline_state,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        PathBuf::from(&self.state_path)
    }

    /// Open the file-backed registry store
    pub fn open_store(&self, metrics: Arc<MetricsRegistry>) -> CliResult<RegistryStore> {
        let persistence = Arc::new(FilePersistence::new(self.state_path()));
        Ok(RegistryStore::open(
            self.merge_engine()?,
            self.registry_keep,
            persistence,
            metrics,
        )?)
    }
}
