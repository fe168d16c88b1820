use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration loaded from `~/.geotrack/config.toml`.
///
/// Every section falls back to its defaults, so an empty file (or no file)
/// yields a working daemon.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load config from `~/.geotrack/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.tracking.validate()?;
        self.restart.validate()?;
        self.storage.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".geotrack")
            .join("config.toml")
    }

    /// Directory holding the persisted intent record, with `~/` expanded.
    pub fn data_dir(&self) -> PathBuf {
        let raw = self.general.data_dir.as_str();
        match raw.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl GeneralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "general.data_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_data_dir() -> String {
    "~/.geotrack".into()
}
fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Upper bound for a bootstrap fetch.
pub const MAX_BOOTSTRAP_TIMEOUT_MS: u64 = 10_000;

/// Upper bound for the restart alarm delay and the inexact slack (one day).
pub const MAX_RESTART_DELAY_SECS: u64 = 24 * 60 * 60;

/// Continuous-subscription and bootstrap timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_bootstrap_timeout_ms")]
    pub bootstrap_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            bootstrap_timeout_ms: default_bootstrap_timeout_ms(),
        }
    }
}

impl TrackingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_ms < 1_000 {
            return Err(ConfigError::Validation(format!(
                "tracking.min_interval_ms must be at least 1000, got {}",
                self.min_interval_ms
            )));
        }
        if self.min_interval_ms > self.interval_ms {
            return Err(ConfigError::Validation(format!(
                "tracking.min_interval_ms ({}) must not exceed tracking.interval_ms ({})",
                self.min_interval_ms, self.interval_ms
            )));
        }
        if self.bootstrap_timeout_ms == 0 || self.bootstrap_timeout_ms > MAX_BOOTSTRAP_TIMEOUT_MS {
            return Err(ConfigError::Validation(format!(
                "tracking.bootstrap_timeout_ms must be in 1..={MAX_BOOTSTRAP_TIMEOUT_MS}, got {}",
                self.bootstrap_timeout_ms
            )));
        }
        Ok(())
    }
}

fn default_interval_ms() -> u64 {
    10_000
}
fn default_min_interval_ms() -> u64 {
    5_000
}
fn default_bootstrap_timeout_ms() -> u64 {
    10_000
}

/// What a user-initiated start does to the manual-stop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualStartPolicy {
    /// A manual start marks the service as manually controlled, so no
    /// restart alarm is armed for it.
    #[default]
    DisableAutoRestart,
    /// A manual start clears the manual-stop flag and re-enables the
    /// restart alarm.
    ResumeAutoRestart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartConfig {
    #[serde(default = "default_restart_delay_secs")]
    pub delay_secs: u64,
    #[serde(default = "default_true")]
    pub exact_alarms: bool,
    #[serde(default = "default_inexact_slack_secs")]
    pub inexact_slack_secs: u64,
    #[serde(default)]
    pub manual_start_policy: ManualStartPolicy,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_restart_delay_secs(),
            exact_alarms: true,
            inexact_slack_secs: default_inexact_slack_secs(),
            manual_start_policy: ManualStartPolicy::default(),
        }
    }
}

impl RestartConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn inexact_slack(&self) -> Duration {
        Duration::from_secs(self.inexact_slack_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delay_secs == 0 {
            return Err(ConfigError::Validation(
                "restart.delay_secs must be positive".to_string(),
            ));
        }
        if self.delay_secs > MAX_RESTART_DELAY_SECS {
            return Err(ConfigError::Validation(format!(
                "restart.delay_secs must not exceed {MAX_RESTART_DELAY_SECS}, got {}",
                self.delay_secs
            )));
        }
        if self.inexact_slack_secs > MAX_RESTART_DELAY_SECS {
            return Err(ConfigError::Validation(format!(
                "restart.inexact_slack_secs must not exceed {MAX_RESTART_DELAY_SECS}, got {}",
                self.inexact_slack_secs
            )));
        }
        Ok(())
    }
}

fn default_restart_delay_secs() -> u64 {
    15 * 60
}
fn default_inexact_slack_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ns = self.namespace.trim();
        if ns.is_empty() {
            return Err(ConfigError::Validation(
                "storage.namespace must not be empty".to_string(),
            ));
        }
        if ns.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "storage.namespace '{}' must not contain path separators",
                self.namespace
            )));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "bg_location_prefs".into()
}

/// Text of the persistent status notice shown while tracking runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_title")]
    pub title: String,
    #[serde(default = "default_notification_text")]
    pub text: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_notification_title(),
            text: default_notification_text(),
        }
    }
}

fn default_notification_title() -> String {
    "Location Tracking Active".into()
}
fn default_notification_text() -> String {
    "Tracking location in background".into()
}

/// Parameters for the simulated provider used by the standalone binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_origin_lat")]
    pub origin_lat: f64,
    #[serde(default = "default_origin_lon")]
    pub origin_lon: f64,
    #[serde(default = "default_jitter_m")]
    pub jitter_m: f64,
    #[serde(default = "default_accuracy_m")]
    pub accuracy_m: f64,
    #[serde(default)]
    pub seed_last_known: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            origin_lat: default_origin_lat(),
            origin_lon: default_origin_lon(),
            jitter_m: default_jitter_m(),
            accuracy_m: default_accuracy_m(),
            seed_last_known: false,
        }
    }
}

fn default_origin_lat() -> f64 {
    37.4220
}
fn default_origin_lon() -> f64 {
    -122.0841
}
fn default_jitter_m() -> f64 {
    25.0
}
fn default_accuracy_m() -> f64 {
    12.0
}
