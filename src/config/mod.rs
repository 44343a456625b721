//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.  The config object is built once at
//! startup and passed into every component; nothing reads it globally.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, BridgeConfig, ConfigError, ListeningConfig, LoggingConfig, ModulesConfig,
    ResponderConfig, SchedulerConfig, ServerConfig, SttConfig, WakeWordConfig,
};
