//! Configuration loading for the reader.
//!
//! Settings are read from `conf/config.toml` unless another path is given.
//! Missing tables or keys fall back to defaults, and a missing or invalid file
//! yields [`AppConfig::default`] so the reader can still start.

mod defaults;
mod io;
mod models;
mod tables;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{AppConfig, LocalPositionsMode, LogLevel};
