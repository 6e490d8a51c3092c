//! Configuration management.
//!
//! TOML-based settings with logical sections, atomic file writes (write
//! to temp, then rename), and `load_or_create` semantics: a missing file
//! is created with defaults, missing fields fall back to theirs.
//!
//! # Example
//!
//! ```no_run
//! use scorepatch_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new(".config/scorepatch.toml");
//! config.load_or_create().unwrap();
//! println!("log filter: {}", config.settings().logging.level);
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{DiffSettings, LoggingSettings, PathSettings, Settings};
