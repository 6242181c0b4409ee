//! Configuration loading for the converter.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! defaults so a conversion can still start; command-line flags override them.

mod defaults;
mod io;
mod models;

pub use io::{DEFAULT_CONFIG_PATH, load_config, parse_config, serialize_config};
pub use models::{AppConfig, EdgeConfig, KokoroConfig, LogLevel, PiperConfig};
