use super::models::{LocalPositionsMode, LogLevel};

pub(crate) fn default_api_base_url() -> String {
    "http://127.0.0.1:8787/api".to_string()
}

pub(crate) fn default_cache_dir() -> String {
    ".cache".to_string()
}

pub(crate) fn default_translation() -> String {
    "ESV".to_string()
}

pub(crate) fn default_prefetch_ahead() -> bool {
    true
}

pub(crate) fn default_volume() -> f32 {
    1.0
}

pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Info
}

pub(crate) fn default_local_positions() -> LocalPositionsMode {
    LocalPositionsMode::File
}
