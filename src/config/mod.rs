//! Configuration module for the transfer facade
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section has
//! defaults, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```yaml
//! s3:
//!   region: "us-east-1"
//!   endpoint: "http://localhost:9000"
//!   access_key: "${AWS_ACCESS_KEY_ID}"
//!   secret_key: "${AWS_SECRET_ACCESS_KEY}"
//!   force_path_style: true
//! transfer:
//!   memory_policy: percent
//!   memory_percent: 20
//!   memory_absolute_bytes: 524288000
//!   concurrent_parts: 1
//!   part_boundary: tiled
//! logging:
//!   level: info
//!   json: false
//! ```

use crate::strategy::{MemoryPolicy, DEFAULT_MEMORY_ABSOLUTE_BYTES, DEFAULT_MEMORY_PERCENT};
use crate::transfer::plan::PartBoundary;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub(crate) fn expand_env_vars(s: &str) -> String {
    let re = env_var_pattern();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

fn env_var_pattern() -> &'static regex_lite::Regex {
    static PATTERN: std::sync::OnceLock<regex_lite::Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}")
            .expect("env var pattern is valid")
    })
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid s3.endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if self.s3.access_key.is_some() != self.s3.secret_key.is_some() {
            return Err(ConfigError::ValidationError(
                "s3.access_key and s3.secret_key must be set together".into(),
            ));
        }

        if self.transfer.concurrent_parts == 0 {
            return Err(ConfigError::ValidationError(
                "transfer.concurrent_parts must be at least 1".into(),
            ));
        }

        if !self.transfer.memory_percent.is_finite() {
            return Err(ConfigError::ValidationError(
                "transfer.memory_percent must be a finite number".into(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid logging.level '{}': must be trace, debug, info, warn or error",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            force_path_style: false,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Which memory policy mode is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPolicyMode {
    #[default]
    Percent,
    Absolute,
}

/// Transfer configuration
///
/// Both thresholds are kept so the mode can be switched without losing the
/// other value; only the one named by `memory_policy` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub memory_policy: MemoryPolicyMode,
    #[serde(default = "default_memory_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_memory_absolute_bytes")]
    pub memory_absolute_bytes: u64,
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
    #[serde(default)]
    pub part_boundary: PartBoundary,
}

impl TransferConfig {
    /// The active memory policy
    pub fn policy(&self) -> MemoryPolicy {
        match self.memory_policy {
            MemoryPolicyMode::Percent => MemoryPolicy::Percent(self.memory_percent),
            MemoryPolicyMode::Absolute => MemoryPolicy::Absolute(self.memory_absolute_bytes),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            memory_policy: MemoryPolicyMode::default(),
            memory_percent: default_memory_percent(),
            memory_absolute_bytes: default_memory_absolute_bytes(),
            concurrent_parts: default_concurrent_parts(),
            part_boundary: PartBoundary::default(),
        }
    }
}

fn default_memory_percent() -> f64 {
    DEFAULT_MEMORY_PERCENT
}

fn default_memory_absolute_bytes() -> u64 {
    DEFAULT_MEMORY_ABSOLUTE_BYTES
}

fn default_concurrent_parts() -> usize {
    1
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is unset. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output. Default: false
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
