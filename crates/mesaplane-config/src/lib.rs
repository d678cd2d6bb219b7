// crates/mesaplane-config/src/lib.rs
// ============================================================================
// Module: Mesaplane Config
// Description: Canonical configuration model, env overrides, and load-time validation.
// Purpose: Give Bootstrap a single fail-closed entry point for startup configuration.
// Dependencies: mesaplane-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is a TOML file with environment-variable overrides
//! (`MESAPLANE_*`). Unknown keys are rejected (`deny_unknown_fields`) rather
//! than silently ignored, and the file itself is bounded in path length,
//! size, and encoding before it is ever parsed, so a misconfigured mount or
//! a truncated file fails loudly at startup instead of producing a
//! half-populated config.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length, in bytes, of a config file path.
pub const MAX_CONFIG_PATH_LEN: usize = 4_096;
/// Maximum length, in bytes, of a single path component.
pub const MAX_CONFIG_PATH_COMPONENT_LEN: usize = 255;
/// Maximum size, in bytes, of the config file itself.
pub const MAX_CONFIG_FILE_BYTES: u64 = 1_048_576;

/// Default listen address when the config omits one.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
/// Default scheduler/trigger/reaper tick parameters.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
/// Default stuck-run timeout in minutes (§4.6).
pub const DEFAULT_STUCK_TIMEOUT_MINUTES: u64 = 120;
/// Default Reaper cadence in minutes (§4.6).
pub const DEFAULT_REAPER_INTERVAL_MINUTES: u64 = 60;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration load/validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config path exceeds [`MAX_CONFIG_PATH_LEN`] bytes.
    #[error("config path exceeds max length")]
    PathTooLong,
    /// A single path component exceeds [`MAX_CONFIG_PATH_COMPONENT_LEN`] bytes.
    #[error("config path component too long")]
    PathComponentTooLong,
    /// Config file exceeds [`MAX_CONFIG_FILE_BYTES`].
    #[error("config file exceeds size limit")]
    FileTooLarge,
    /// Config file is not valid UTF-8.
    #[error("config file must be utf-8")]
    NotUtf8,
    /// Config file could not be read.
    #[error("config file io error: {0}")]
    Io(String),
    /// TOML content failed to parse or contained an unknown key.
    #[error("config parse error: {0}")]
    Parse(String),
    /// A known field failed semantic validation.
    #[error("config validation error: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level configuration envelope.
///
/// # Invariants
/// - Unknown top-level or nested keys are rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MesaplaneConfig {
    /// HTTP listen address for the Request Layer.
    pub listen_addr: String,
    /// Metadata database connection string.
    pub database_url: String,
    /// Object-store collaborator configuration.
    pub object_store: ObjectStoreConfig,
    /// Catalog service collaborator configuration.
    pub catalog: CatalogConfig,
    /// Warm executor collaborator configuration.
    pub worker: WorkerConfig,
    /// Plugin-slot addresses, keyed by slot name.
    pub plugins: BTreeMap<String, PluginConfig>,
    /// Retention and stuck-run parameters consumed by the Reaper.
    pub retention: RetentionConfig,
    /// Poll interval, in seconds, for the Run Engine poll loop.
    pub poll_interval_seconds: u64,
    /// Rate-limiter parameters for the Request Layer.
    pub rate_limit: RateLimitConfig,
    /// Opaque license key; decoded for display only, never parsed for gating logic.
    pub license_key: Option<String>,
}

impl Default for MesaplaneConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            database_url: "mesaplane.sqlite3".to_string(),
            object_store: ObjectStoreConfig::default(),
            catalog: CatalogConfig::default(),
            worker: WorkerConfig::default(),
            plugins: BTreeMap::new(),
            retention: RetentionConfig::default(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            rate_limit: RateLimitConfig::default(),
            license_key: None,
        }
    }
}

/// Object-store endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObjectStoreConfig {
    /// S3-style endpoint URL.
    pub endpoint: String,
    /// Access key id.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self { endpoint: String::new(), access_key_id: None, secret_access_key: None }
    }
}

/// Catalog service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CatalogConfig {
    /// Catalog REST base URL.
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { url: String::new() }
    }
}

/// Warm executor endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkerConfig {
    /// Worker RPC endpoint address.
    pub address: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { address: String::new() }
    }
}

/// One configured plugin-slot endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// RPC endpoint address.
    pub address: String,
}

/// System-wide retention defaults. The Reaper merges each pipeline's
/// nullable `RetentionOverrides` over these field-by-field at sweep time
/// for run pruning, log expiry, and quality-history pruning; catalog-branch
/// cleanup has no per-pipeline override (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionConfig {
    /// Maximum Run rows retained per pipeline.
    pub max_runs_per_pipeline: u32,
    /// Maximum Run row age, in days.
    pub max_age_days: u32,
    /// Log artifact retention, in days.
    pub log_retention_days: u32,
    /// Minutes a `running` run may go without progress before the Reaper
    /// force-fails it.
    pub stuck_timeout_minutes: u64,
    /// Reaper tick cadence, in minutes.
    pub reaper_interval_minutes: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_runs_per_pipeline: 1_000,
            max_age_days: 90,
            log_retention_days: 30,
            stuck_timeout_minutes: DEFAULT_STUCK_TIMEOUT_MINUTES,
            reaper_interval_minutes: DEFAULT_REAPER_INTERVAL_MINUTES,
        }
    }
}

/// Fixed-window rate-limit parameters, read by
/// `mesaplane_server::rate_limit::RateLimiterConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitConfig {
    /// Maximum requests a single client may make per window.
    pub capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

// ============================================================================
// SECTION: Load
// ============================================================================

impl MesaplaneConfig {
    /// Loads configuration from an optional TOML file, applying
    /// `MESAPLANE_*` environment overrides on top, then validates the
    /// result. When `path` is `None`, the built-in defaults are used before
    /// overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the path is unsafe, the file cannot be
    /// read as bounded UTF-8, the TOML fails to parse, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let raw_path = path.as_os_str().len();
        if raw_path > MAX_CONFIG_PATH_LEN {
            return Err(ConfigError::PathTooLong);
        }
        for component in path.iter() {
            if component.len() > MAX_CONFIG_PATH_COMPONENT_LEN {
                return Err(ConfigError::PathComponentTooLong);
            }
        }
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_BYTES {
            return Err(ConfigError::FileTooLarge);
        }
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let text = String::from_utf8(bytes).map_err(|_err| ConfigError::NotUtf8)?;
        toml::from_str(&text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("MESAPLANE_LISTEN_ADDR") {
            self.listen_addr = value;
        }
        if let Ok(value) = env::var("MESAPLANE_DATABASE_URL") {
            self.database_url = value;
        }
        if let Ok(value) = env::var("MESAPLANE_LICENSE_KEY") {
            self.license_key = Some(value);
        }
    }

    /// Validates known fields; unknown TOML keys were already rejected at parse time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "listen_addr is not a valid socket address: {}",
                self.listen_addr
            )));
        }
        if self.database_url.is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".to_string()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid("poll_interval_seconds must be > 0".to_string()));
        }
        if self.retention.reaper_interval_minutes == 0 {
            return Err(ConfigError::Invalid("retention.reaper_interval_minutes must be > 0".to_string()));
        }
        for name in self.plugins.keys() {
            if mesaplane_core::PluginSlot::parse(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown plugin slot: {name}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn load_defaults_validate_cleanly() {
        let config = MesaplaneConfig::load(None).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn load_rejects_path_too_long() {
        let long_path = "a".repeat(MAX_CONFIG_PATH_LEN + 1);
        let err = MesaplaneConfig::load(Some(Path::new(&long_path))).unwrap_err();
        assert!(matches!(err, ConfigError::PathTooLong));
    }

    #[test]
    fn load_rejects_oversized_file() {
        let mut file = NamedTempFile::new().unwrap();
        let payload = vec![b'a'; (MAX_CONFIG_FILE_BYTES + 1) as usize];
        file.write_all(&payload).unwrap();
        let err = MesaplaneConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::FileTooLarge));
    }

    #[test]
    fn load_rejects_non_utf8_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xFF, 0xFE, 0xFF]).unwrap();
        let err = MesaplaneConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::NotUtf8));
    }

    #[test]
    fn load_rejects_unknown_key() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not_a_real_field = true").unwrap();
        let err = MesaplaneConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn validate_rejects_bad_listen_addr() {
        let mut config = MesaplaneConfig::default();
        config.listen_addr = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_plugin_slot() {
        let mut config = MesaplaneConfig::default();
        config.plugins.insert("not-a-slot".to_string(), PluginConfig { address: "x".to_string() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_known_plugin_slot() {
        let mut config = MesaplaneConfig::default();
        config.plugins.insert("executor".to_string(), PluginConfig { address: "127.0.0.1:9000".to_string() });
        assert!(config.validate().is_ok());
    }
}
