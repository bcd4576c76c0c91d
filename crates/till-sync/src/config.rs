//! # Queue Configuration
//!
//! Configuration for the offline sale queue.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_BACKEND_URL=https://api.example.com                           │
//! │     TILL_DEVICE_ID=abc-123                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/queue.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.till.pos/queue.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device id, 2s/60s/8 retry policy                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [backend]
//! base_url = "https://api.example.com"
//! submit_timeout_secs = 10
//!
//! [retry]
//! base_delay_ms = 2000
//! max_delay_secs = 60
//! jitter = 0.2
//! max_attempts = 8
//!
//! [queue]
//! start_online = true
//! confirmed_view_limit = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use till_core::RetryPolicy;

use crate::error::{QueueError, QueueResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4), generated on first run.
    pub id: String,

    /// Human-readable device name (e.g., "Register 1").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "POS Terminal".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Backend Settings
// =============================================================================

/// Where sales are submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the backend (`http://` or `https://`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every submission.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Per-attempt timeout (seconds).
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// Interval between connectivity probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_submit_timeout() -> u64 {
    10
}
fn default_probe_interval() -> u64 {
    15
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            api_token: None,
            submit_timeout_secs: default_submit_timeout(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff parameters, in file-friendly units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,

    /// Fraction in `[0, 1)`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay() -> u64 {
    till_core::retry::DEFAULT_BASE_DELAY.as_millis() as u64
}
fn default_max_delay() -> u64 {
    till_core::retry::DEFAULT_MAX_DELAY.as_secs()
}
fn default_jitter() -> f64 {
    till_core::retry::DEFAULT_JITTER
}
fn default_max_attempts() -> u32 {
    till_core::retry::DEFAULT_MAX_ATTEMPTS
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            base_delay_ms: default_base_delay(),
            max_delay_secs: default_max_delay(),
            jitter: default_jitter(),
            max_attempts: default_max_attempts(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Coordinator behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Dispatch attempts immediately on start.
    #[serde(default = "default_start_online")]
    pub start_online: bool,

    /// How many confirmed sales snapshots carry.
    #[serde(default = "default_confirmed_view_limit")]
    pub confirmed_view_limit: u32,

    /// Confirmed sales older than this are pruned.
    #[serde(default = "default_retention_days")]
    pub confirmed_retention_days: u32,

    /// Capacity of the coordinator's command channel.
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_start_online() -> bool {
    true
}
fn default_confirmed_view_limit() -> u32 {
    50
}
fn default_retention_days() -> u32 {
    7
}
fn default_command_buffer() -> usize {
    64
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            start_online: default_start_online(),
            confirmed_view_limit: default_confirmed_view_limit(),
            confirmed_retention_days: default_retention_days(),
            command_buffer: default_command_buffer(),
        }
    }
}

// =============================================================================
// Main Queue Configuration
// =============================================================================

/// Complete queue configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub queue: QueueSettings,
}

impl QueueConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (queue.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> QueueResult<Self> {
        Self::load_file(config_path)?.with_overrides(|key| std::env::var(key).ok())
    }

    /// Loads defaults and the config file only. This is the form that is
    /// safe to write back: environment values such as the API token never
    /// end up in it.
    pub fn load_file(config_path: Option<PathBuf>) -> QueueResult<Self> {
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading queue config from file");
                let contents = std::fs::read_to_string(&path)?;
                return Ok(toml::from_str(&contents)?);
            }
            debug!(?path, "Config file not found, using defaults");
        }

        Ok(Self::default())
    }

    /// Applies overrides from a key lookup (the environment in production)
    /// and validates the result.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        self.apply_overrides(lookup);
        self.validate()?;
        Ok(self)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> QueueResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| QueueError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| QueueError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| QueueError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Queue config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> QueueResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(QueueError::MissingDeviceId);
        }

        let url = &self.backend.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(QueueError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                url
            )));
        }

        if self.backend.submit_timeout_secs == 0 {
            return Err(QueueError::InvalidConfig(
                "submit_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.backend.probe_interval_secs == 0 {
            return Err(QueueError::InvalidConfig(
                "probe_interval_secs must be greater than 0".into(),
            ));
        }

        if self.queue.command_buffer == 0 {
            return Err(QueueError::InvalidConfig(
                "command_buffer must be greater than 0".into(),
            ));
        }

        self.retry_policy()
            .validate()
            .map_err(|e| QueueError::InvalidConfig(e.to_string()))?;

        Ok(())
    }

    /// Applies overrides from a key lookup (the environment in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("TILL_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(url) = lookup("TILL_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Some(token) = lookup("TILL_API_TOKEN") {
            self.backend.api_token = Some(token);
        }

        if let Some(value) = lookup("TILL_MAX_ATTEMPTS") {
            match value.parse::<u32>() {
                Ok(n) => self.retry.max_attempts = n,
                Err(_) => warn!(value = %value, "Ignoring invalid TILL_MAX_ATTEMPTS"),
            }
        }

        if let Some(value) = lookup("TILL_SUBMIT_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(n) => self.backend.submit_timeout_secs = n,
                Err(_) => warn!(value = %value, "Ignoring invalid TILL_SUBMIT_TIMEOUT_SECS"),
            }
        }

        if let Some(value) = lookup("TILL_START_ONLINE") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.queue.start_online = true,
                "0" | "false" | "no" => self.queue.start_online = false,
                _ => warn!(value = %value, "Ignoring invalid TILL_START_ONLINE"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("queue.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            jitter: self.retry.jitter,
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.submit_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.backend.probe_interval_secs)
    }

    pub fn confirmed_retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.queue.confirmed_retention_days) * 24 * 60 * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert!(!config.device.id.is_empty());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.submit_timeout(), Duration::from_secs(10));
        assert!(config.queue.start_online);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = QueueConfig::default();

        config.device.id = String::new();
        assert!(matches!(config.validate(), Err(QueueError::MissingDeviceId)));

        config.device.id = "reg-1".to_string();
        config.backend.base_url = "ftp://nope".to_string();
        assert!(matches!(config.validate(), Err(QueueError::InvalidUrl(_))));

        config.backend.base_url = "https://api.example.com".to_string();
        config.retry.jitter = 2.0;
        assert!(matches!(config.validate(), Err(QueueError::InvalidConfig(_))));

        config.retry.jitter = 0.1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("TILL_DEVICE_ID", "reg-7"),
            ("TILL_BACKEND_URL", "https://pos.example.com"),
            ("TILL_API_TOKEN", "secret"),
            ("TILL_MAX_ATTEMPTS", "3"),
            ("TILL_SUBMIT_TIMEOUT_SECS", "not-a-number"),
            ("TILL_START_ONLINE", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = QueueConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.device_id(), "reg-7");
        assert_eq!(config.backend.base_url, "https://pos.example.com");
        assert_eq!(config.backend.api_token.as_deref(), Some("secret"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.backend.submit_timeout_secs, 10);
        assert!(!config.queue.start_online);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: QueueConfig = toml::from_str(
            r#"
            [device]
            id = "reg-2"

            [retry]
            max_attempts = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.device.name, "POS Terminal");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.queue.confirmed_view_limit, 50);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = std::env::temp_dir().join(format!("till-queue-{}.toml", Uuid::new_v4()));
        let mut config = QueueConfig::default();
        config.device.name = "Register 9".to_string();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[device]"));
        assert!(contents.contains("[retry]"));

        let loaded: QueueConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.device.name, "Register 9");
        assert_eq!(loaded.device.id, config.device.id);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_file_config_keeps_environment_out() {
        let path = std::env::temp_dir().join(format!("till-queue-{}.toml", Uuid::new_v4()));
        let env: HashMap<&str, &str> = [
            ("TILL_API_TOKEN", "secret"),
            ("TILL_BACKEND_URL", "https://pos.example.com"),
        ]
        .into_iter()
        .collect();

        let file = QueueConfig::load_file(Some(path.clone())).unwrap();
        file.save(Some(path.clone())).unwrap();
        let config = file
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend.api_token.as_deref(), Some("secret"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("secret"));
        assert!(!contents.contains("pos.example.com"));

        let reloaded = QueueConfig::load_file(Some(path.clone())).unwrap();
        assert_eq!(reloaded.device_id(), config.device_id());
        assert!(reloaded.backend.api_token.is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_retention() {
        let config = QueueConfig::default();
        assert_eq!(config.confirmed_retention(), Duration::from_secs(7 * 86_400));
    }
}
