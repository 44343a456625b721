//! Application settings structs, defaults, validation and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to each
//! component's constructor.  Missing fields fall back to their defaults, so
//! a settings file only needs to mention what it overrides.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A settings value that cannot be used as configured.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {expected} (got {got})")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error(
        "listening timeout ({timeout}s) must be longer than listening patience ({patience}s)"
    )]
    TimeoutShorterThanPatience { timeout: f32, patience: f32 },
}

fn out_of_range(field: &'static str, expected: &'static str, got: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        expected,
        got: got.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ListeningConfig
// ---------------------------------------------------------------------------

/// Wake-word detection and endpoint detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningConfig {
    /// Trailing wake-word score (0.0 – 1.0) above which a detection fires.
    pub detection_threshold: f32,
    /// Seconds of continuous sub-threshold amplitude that end a recording.
    pub listening_patience_secs: f32,
    /// Absolute session length in seconds before the session times out.
    pub listening_timeout_secs: f32,
    /// Lowest allowed adaptive silence threshold, in i16 amplitude units.
    pub noise_floor: i16,
    /// Seconds after detection during which speech cannot start (the tail
    /// of the wake word itself).
    pub grace_period_secs: f32,
    /// Seconds of audio kept before detection for noise-floor estimation.
    pub pre_trigger_secs: f32,
    /// Samples per audio frame.
    pub frame_size: usize,
    /// Capture sample rate in Hz after resampling.
    pub sample_rate: u32,
    /// Input device name; `None` means the system default.
    pub audio_device: Option<String>,
    /// Directory where encoded utterances are archived; `None` disables it.
    pub recordings_dir: Option<PathBuf>,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            listening_patience_secs: 2.0,
            listening_timeout_secs: 30.0,
            noise_floor: 300,
            grace_period_secs: 1.0,
            pre_trigger_secs: 60.0,
            frame_size: 1280,
            sample_rate: 16_000,
            audio_device: None,
            recordings_dir: None,
        }
    }
}

impl ListeningConfig {
    /// Number of samples the pre-trigger buffer holds.
    pub fn pre_trigger_samples(&self) -> usize {
        (self.pre_trigger_secs * self.sample_rate as f32).round() as usize
    }

    /// Silence duration that ends a recording normally.
    pub fn patience(&self) -> Duration {
        Duration::try_from_secs_f32(self.listening_patience_secs).unwrap_or(Duration::ZERO)
    }

    /// Absolute session length before a timeout.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f32(self.listening_timeout_secs).unwrap_or(Duration::ZERO)
    }

    /// Window after detection during which speech cannot start.
    pub fn grace_period(&self) -> Duration {
        Duration::try_from_secs_f32(self.grace_period_secs).unwrap_or(Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// WakeWordConfig
// ---------------------------------------------------------------------------

/// Tuning for the built-in energy-spike wake detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeWordConfig {
    /// Frame RMS must exceed the running average by this factor to score.
    pub spike_ratio: f32,
    /// Running average RMS below which no spike is reported.
    pub min_energy: f32,
    /// Weight of the previous running average (0.0 – 1.0).
    pub smoothing: f32,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            spike_ratio: 3.0,
            min_energy: 100.0,
            smoothing: 0.9,
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Settings for the serialising task scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on how long the worker waits for a task before it
    /// re-checks the shutdown flag.
    pub poll_interval_ms: u64,
    /// Task names scheduled without an info-level log line.
    pub quiet_tasks: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            quiet_tasks: vec!["bridge-drain".into()],
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// BridgeConfig
// ---------------------------------------------------------------------------

/// Settings for the cross-process command bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long the drain task sleeps when no message is waiting.
    pub idle_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { idle_delay_ms: 1_000 }
    }
}

impl BridgeConfig {
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper transcriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model name (resolved to `<models_dir>/ggml-<model>.bin`).
    pub model: String,
    /// ISO-639-1 language code, or `"auto"` for Whisper's detection.
    pub language: String,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: "base.en".into(),
            language: "en".into(),
            use_gpu: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ResponderConfig
// ---------------------------------------------------------------------------

/// Settings for the chat endpoint that answers utterances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// API key; `None` for local providers.
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Maximum seconds to wait for a response.
    pub timeout_secs: u64,
    /// System message sent ahead of the utterance.
    pub system_prompt: String,
    /// Previous exchanges replayed with each request.
    pub history_turns: usize,
    /// Idle seconds after which the conversation history is forgotten.
    pub history_reset_secs: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            api_key: None,
            model: "llama3.2".into(),
            temperature: 0.3,
            timeout_secs: 30,
            system_prompt: "You are a voice assistant. Answer in one or two short sentences."
                .into(),
            history_turns: 3,
            history_reset_secs: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// The separate request-serving process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Spawn the server at startup.
    pub enabled: bool,
    /// Executable to run.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "ami-server".into(),
            args: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ModulesConfig / LoggingConfig
// ---------------------------------------------------------------------------

/// Optional assistant modules registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub enabled: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "calendar".into(),
                "markdown".into(),
                "media".into(),
                "utils".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// Built once in `main` and passed by reference into every component.
///
/// ```rust,no_run
/// use ami_runtime::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listening: ListeningConfig,
    pub wake_word: WakeWordConfig,
    pub scheduler: SchedulerConfig,
    pub bridge: BridgeConfig,
    pub stt: SttConfig,
    pub responder: ResponderConfig,
    pub server: ServerConfig,
    pub modules: ModulesConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every value the runtime depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.listening;

        if !(l.detection_threshold > 0.0 && l.detection_threshold <= 1.0) {
            return Err(out_of_range(
                "listening.detection_threshold",
                "in (0, 1]",
                l.detection_threshold,
            ));
        }
        if l.listening_patience_secs <= 0.0 {
            return Err(out_of_range(
                "listening.listening_patience_secs",
                "positive",
                l.listening_patience_secs,
            ));
        }
        if l.listening_timeout_secs <= l.listening_patience_secs {
            return Err(ConfigError::TimeoutShorterThanPatience {
                timeout: l.listening_timeout_secs,
                patience: l.listening_patience_secs,
            });
        }
        if l.grace_period_secs < 0.0 {
            return Err(out_of_range(
                "listening.grace_period_secs",
                "zero or positive",
                l.grace_period_secs,
            ));
        }
        if l.noise_floor < 0 {
            return Err(out_of_range("listening.noise_floor", "zero or positive", l.noise_floor));
        }
        if l.frame_size == 0 {
            return Err(out_of_range("listening.frame_size", "positive", l.frame_size));
        }
        if l.sample_rate == 0 {
            return Err(out_of_range("listening.sample_rate", "positive", l.sample_rate));
        }
        if l.pre_trigger_samples() == 0 {
            return Err(out_of_range(
                "listening.pre_trigger_secs",
                "at least one sample long",
                l.pre_trigger_secs,
            ));
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(out_of_range(
                "scheduler.poll_interval_ms",
                "positive",
                self.scheduler.poll_interval_ms,
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(
            original.listening.detection_threshold,
            loaded.listening.detection_threshold
        );
        assert_eq!(original.listening.noise_floor, loaded.listening.noise_floor);
        assert_eq!(original.listening.frame_size, loaded.listening.frame_size);
        assert_eq!(
            original.scheduler.poll_interval_ms,
            loaded.scheduler.poll_interval_ms
        );
        assert_eq!(original.scheduler.quiet_tasks, loaded.scheduler.quiet_tasks);
        assert_eq!(original.responder.base_url, loaded.responder.base_url);
        assert_eq!(original.responder.api_key, loaded.responder.api_key);
        assert_eq!(original.modules.enabled, loaded.modules.enabled);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.listening.sample_rate, 16_000);
        assert_eq!(config.bridge.idle_delay_ms, 1_000);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[listening]\nlistening_patience_secs = 3.5\n\n[server]\nenabled = true\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.listening.listening_patience_secs, 3.5);
        assert_eq!(config.listening.listening_timeout_secs, 30.0);
        assert!(config.server.enabled);
        assert_eq!(config.server.program, "ami-server");
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.listening.detection_threshold, 0.5);
        assert_eq!(cfg.listening.pre_trigger_samples(), 960_000);
        assert_eq!(cfg.listening.patience(), Duration::from_secs(2));
        assert_eq!(cfg.scheduler.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.scheduler.quiet_tasks, vec!["bridge-drain".to_string()]);
        assert!(cfg.listening.recordings_dir.is_none());
        assert!(!cfg.server.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_timeout_not_longer_than_patience() {
        let mut cfg = AppConfig::default();
        cfg.listening.listening_patience_secs = 5.0;
        cfg.listening.listening_timeout_secs = 5.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TimeoutShorterThanPatience { .. })
        ));
    }

    #[test]
    fn validate_rejects_threshold_out_of_range() {
        let mut cfg = AppConfig::default();
        cfg.listening.detection_threshold = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("detection_threshold"), "{err}");
    }

    #[test]
    fn validate_rejects_zero_poll_interval() {
        let mut cfg = AppConfig::default();
        cfg.scheduler.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
