use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime tunables persisted in the history store
///
/// Serialized as a single camelCase JSON blob. Every field has a default so a
/// blob written by an older build (or edited by hand) merges with the
/// built-in values instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Master switch; when false every recorder operation is a no-op
    #[serde(default = "default_logging_enabled")]
    pub logging_enabled: bool,

    /// Soft cap on records kept per owner key (default: 1000)
    #[serde(default = "default_max_records_per_key")]
    pub max_records_per_key: u64,

    /// Serialized request body size above which messages are truncated (default: 100KB)
    #[serde(default = "default_max_body_size")]
    pub max_request_body_size: usize,

    /// Serialized response body size above which it is summarized (default: 100KB)
    #[serde(default = "default_max_body_size")]
    pub max_response_body_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            logging_enabled: default_logging_enabled(),
            max_records_per_key: default_max_records_per_key(),
            max_request_body_size: default_max_body_size(),
            max_response_body_size: default_max_body_size(),
        }
    }
}

impl HistoryConfig {
    /// Rebuild a config from a stored blob.
    ///
    /// Each field is validated on its own, like an admin update applied over
    /// the defaults, so one bad field never discards its valid siblings.
    pub fn from_stored(value: &serde_json::Value) -> Self {
        ConfigPatch::from_json(value).apply(&Self::default())
    }
}

fn default_logging_enabled() -> bool {
    true
}

fn default_max_records_per_key() -> u64 {
    1000
}

fn default_max_body_size() -> usize {
    100 * 1024
}

/// Partial update for [`HistoryConfig`]
///
/// Numeric fields are signed so out-of-range input (`-5`) survives parsing
/// and is rejected field by field when the patch is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub logging_enabled: Option<bool>,
    pub max_records_per_key: Option<i64>,
    pub max_request_body_size: Option<i64>,
    pub max_response_body_size: Option<i64>,
}

impl ConfigPatch {
    /// Build a patch from an admin JSON payload (camelCase keys).
    ///
    /// Ill-typed fields are dropped with a warning; the remaining fields are
    /// still applied.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut patch = Self::default();

        let Some(object) = value.as_object() else {
            tracing::warn!("Config update payload is not an object, ignoring");
            return patch;
        };

        if let Some(v) = object.get("loggingEnabled") {
            match v.as_bool() {
                Some(b) => patch.logging_enabled = Some(b),
                None => tracing::warn!(value = %v, "Ignoring non-boolean loggingEnabled"),
            }
        }

        patch.max_records_per_key = integer_field(object, "maxRecordsPerKey");
        patch.max_request_body_size = integer_field(object, "maxRequestBodySize");
        patch.max_response_body_size = integer_field(object, "maxResponseBodySize");

        patch
    }

    pub fn is_empty(&self) -> bool {
        self.logging_enabled.is_none()
            && self.max_records_per_key.is_none()
            && self.max_request_body_size.is_none()
            && self.max_response_body_size.is_none()
    }

    /// Merge the valid fields of this patch onto `base`
    pub fn apply(&self, base: &HistoryConfig) -> HistoryConfig {
        let mut next = base.clone();

        if let Some(enabled) = self.logging_enabled {
            next.logging_enabled = enabled;
        }
        if let Some(n) = positive("maxRecordsPerKey", self.max_records_per_key) {
            next.max_records_per_key = n;
        }
        if let Some(n) = positive("maxRequestBodySize", self.max_request_body_size) {
            next.max_request_body_size = n as usize;
        }
        if let Some(n) = positive("maxResponseBodySize", self.max_response_body_size) {
            next.max_response_body_size = n as usize;
        }

        next
    }
}

fn integer_field(object: &serde_json::Map<String, serde_json::Value>, name: &str) -> Option<i64> {
    let value = object.get(name)?;
    match value.as_i64() {
        Some(n) => Some(n),
        None => {
            tracing::warn!(field = name, value = %value, "Ignoring non-integer config field");
            None
        }
    }
}

fn positive(field: &'static str, value: Option<i64>) -> Option<u64> {
    match value {
        Some(n) if n > 0 => Some(n as u64),
        Some(n) => {
            tracing::warn!(field = field, value = n, "Ignoring non-positive config field");
            None
        }
        None => None,
    }
}

/// Process settings for the admin binary and embedders
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// SQLite database path (default: "./data/request_history.db")
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Log level used when RUST_LOG is not set (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "text" or "json" (default: "text")
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retention: RetentionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database: DatabaseSettings::default(),
            retention: RetentionSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    /// Maximum pooled connections (default: 5)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Seconds SQLite waits on a locked database (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_timeout_secs(),
            busy_timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetentionSettings {
    /// Delete records older than this many days (default: disabled)
    #[serde(default)]
    pub max_age_days: Option<u32>,

    /// Seconds between age-based cleanup runs (default: 3600)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_database_path() -> String {
    "./data/request_history.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

/// Load settings from an optional TOML file plus `REQUEST_HISTORY__*` env vars
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("REQUEST_HISTORY").separator("__"))
        .build()?;

    let settings: Settings = settings.try_deserialize()?;
    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_settings(settings: &Settings) -> anyhow::Result<()> {
    if settings.database_path.trim().is_empty() {
        anyhow::bail!("database_path cannot be empty");
    }

    match settings.log_format.as_str() {
        "text" | "json" => {}
        other => anyhow::bail!("Unsupported log_format '{}', expected 'text' or 'json'", other),
    }

    if settings.database.max_connections == 0 {
        anyhow::bail!("database.max_connections must be at least 1");
    }

    if settings.retention.cleanup_interval_secs == 0 {
        anyhow::bail!("retention.cleanup_interval_secs must be greater than 0");
    }

    if settings.retention.max_age_days == Some(0) {
        anyhow::bail!("retention.max_age_days must be greater than 0 when set");
    }

    Ok(())
}
