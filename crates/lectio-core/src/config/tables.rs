use super::defaults;
use super::models::{AppConfig, LocalPositionsMode, LogLevel};
use serde::{Deserialize, Serialize};

/// On-disk layout of `config.toml`, grouped into tables.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(super) struct ConfigTables {
    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    listening: ListeningConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

impl From<ConfigTables> for AppConfig {
    fn from(tables: ConfigTables) -> Self {
        AppConfig {
            api_base_url: tables.api.base_url,
            api_token: tables.api.token.filter(|token| !token.trim().is_empty()),
            default_translation: tables.api.default_translation,
            prefetch_ahead: tables.listening.prefetch_ahead,
            volume: tables.listening.volume.clamp(0.0, 1.0),
            cache_dir: tables.storage.cache_dir,
            local_positions: tables.storage.local_positions,
            log_level: tables.logging.log_level,
        }
    }
}

impl From<&AppConfig> for ConfigTables {
    fn from(config: &AppConfig) -> Self {
        ConfigTables {
            api: ApiConfig {
                base_url: config.api_base_url.clone(),
                token: config.api_token.clone(),
                default_translation: config.default_translation.clone(),
            },
            listening: ListeningConfig {
                prefetch_ahead: config.prefetch_ahead,
                volume: config.volume,
            },
            storage: StorageConfig {
                cache_dir: config.cache_dir.clone(),
                local_positions: config.local_positions,
            },
            logging: LoggingConfig {
                log_level: config.log_level,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ApiConfig {
    #[serde(default = "defaults::default_api_base_url")]
    base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default = "defaults::default_translation")]
    default_translation: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: defaults::default_api_base_url(),
            token: None,
            default_translation: defaults::default_translation(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ListeningConfig {
    #[serde(default = "defaults::default_prefetch_ahead")]
    prefetch_ahead: bool,
    #[serde(default = "defaults::default_volume")]
    volume: f32,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        ListeningConfig {
            prefetch_ahead: defaults::default_prefetch_ahead(),
            volume: defaults::default_volume(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct StorageConfig {
    #[serde(default = "defaults::default_cache_dir")]
    cache_dir: String,
    #[serde(default = "defaults::default_local_positions")]
    local_positions: LocalPositionsMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            cache_dir: defaults::default_cache_dir(),
            local_positions: defaults::default_local_positions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct LoggingConfig {
    #[serde(default = "defaults::default_log_level")]
    log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: defaults::default_log_level(),
        }
    }
}
