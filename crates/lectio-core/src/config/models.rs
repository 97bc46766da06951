use super::defaults;
use serde::{Deserialize, Serialize};

/// Flattened runtime configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "defaults::default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "defaults::default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "defaults::default_translation")]
    pub default_translation: String,
    #[serde(default = "defaults::default_prefetch_ahead")]
    pub prefetch_ahead: bool,
    #[serde(default = "defaults::default_volume")]
    pub volume: f32,
    #[serde(default = "defaults::default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "defaults::default_local_positions")]
    pub local_positions: LocalPositionsMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api_base_url: defaults::default_api_base_url(),
            api_token: None,
            cache_dir: defaults::default_cache_dir(),
            default_translation: defaults::default_translation(),
            prefetch_ahead: defaults::default_prefetch_ahead(),
            volume: defaults::default_volume(),
            log_level: defaults::default_log_level(),
            local_positions: defaults::default_local_positions(),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Where device-local reading positions are kept.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocalPositionsMode {
    /// TOML files under `cache_dir`.
    #[default]
    File,
    /// Process memory only; nothing survives a restart.
    Memory,
}
