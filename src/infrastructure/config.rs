//! Configuration infrastructure
//!
//! A small JSON document next to the user's other app configs. A missing file
//! is created with defaults; missing keys are filled from defaults without
//! touching the keys that are present.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

pub const APP_DIR_NAME: &str = "agro-price-digest";
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default configuration values
pub mod defaults {
    pub const DESTINATION_IDENTIFIER: &str = "Cotações Agro";
    pub const SEND_TIME_LOCAL: &str = "08:00";
    pub const TIMEZONE: &str = "America/Sao_Paulo";
    pub const HTTP_TIMEOUT_SECONDS: u64 = 15;
    pub const BROWSER_TIMEOUT_SECONDS: u64 = 45;
    pub const COMMODITY_TIMEOUT_SECONDS: u64 = 60;
    pub const GLOBAL_TIMEOUT_SECONDS: u64 = 180;
    pub const LOG_LEVEL: &str = "info";

    pub const CACHE_FILE_NAME: &str = "quotes_cache.json";
    pub const PREVIEW_FILE_NAME: &str = "last_message.txt";
    pub const LOG_DIR_NAME: &str = "logs";
    pub const BROWSER_PROFILE_DIR_NAME: &str = "browser_profile";
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat (or other destination) that receives the summary
    pub destination_identifier: String,

    /// Daily trigger for `schedule`, `HH:MM` in `timezone`
    pub send_time_local: String,

    /// IANA zone used for every displayed or cached timestamp
    pub timezone: String,

    /// Cache, preview, logs and browser profile live here
    pub data_dir: PathBuf,

    pub http_timeout_seconds: u64,
    pub browser_timeout_seconds: u64,
    pub commodity_timeout_seconds: u64,
    pub global_timeout_seconds: u64,

    /// Allow the browser fallback after the HTTP path fails
    pub browser_enabled: bool,
    pub browser_headless: bool,

    /// Log level: "error", "warn", "info", "debug", "trace"
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            destination_identifier: defaults::DESTINATION_IDENTIFIER.to_string(),
            send_time_local: defaults::SEND_TIME_LOCAL.to_string(),
            timezone: defaults::TIMEZONE.to_string(),
            data_dir: ConfigManager::get_app_data_dir(),
            http_timeout_seconds: defaults::HTTP_TIMEOUT_SECONDS,
            browser_timeout_seconds: defaults::BROWSER_TIMEOUT_SECONDS,
            commodity_timeout_seconds: defaults::COMMODITY_TIMEOUT_SECONDS,
            global_timeout_seconds: defaults::GLOBAL_TIMEOUT_SECONDS,
            browser_enabled: true,
            browser_headless: true,
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl AppConfig {
    /// Parsed `timezone`
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", self.timezone, e))
    }

    /// Parsed `send_time_local`
    pub fn send_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.send_time_local, "%H:%M")
            .with_context(|| format!("Invalid send_time_local '{}' (expected HH:MM)", self.send_time_local))
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        self.send_time()?;
        if self.destination_identifier.trim().is_empty() {
            return Err(anyhow!("destination_identifier must not be empty"));
        }
        if self.commodity_timeout_seconds == 0 || self.global_timeout_seconds == 0 {
            return Err(anyhow!("timeouts must be greater than zero"));
        }
        Ok(())
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join(defaults::CACHE_FILE_NAME)
    }

    #[must_use]
    pub fn preview_path(&self) -> PathBuf {
        self.data_dir.join(defaults::PREVIEW_FILE_NAME)
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join(defaults::LOG_DIR_NAME)
    }

    #[must_use]
    pub fn browser_profile_dir(&self) -> PathBuf {
        self.data_dir.join(defaults::BROWSER_PROFILE_DIR_NAME)
    }
}

/// Add every key of `defaults` that `target` lacks, recursing into objects.
///
/// Returns whether anything was added. Present keys are never overwritten.
pub fn fill_missing_keys(target: &mut Value, defaults: &Value) -> bool {
    let (Some(target), Some(defaults)) = (target.as_object_mut(), defaults.as_object()) else {
        return false;
    };

    let mut changed = false;
    for (key, default_value) in defaults {
        match target.get_mut(key) {
            Some(existing) => changed |= fill_missing_keys(existing, default_value),
            None => {
                info!("Added missing configuration key '{}'", key);
                target.insert(key.clone(), default_value.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory, falling back to the working directory
    #[must_use]
    pub fn get_app_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration, creating the file or filling missing keys as needed
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        let config = match self.merge_with_defaults(&content).await {
            Ok(config) => config,
            Err(e) => {
                warn!("⚠️ Configuration file unusable: {:#}", e);
                self.reset_corrupted().await?
            }
        };

        config.validate().with_context(|| format!("Invalid configuration in {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    async fn merge_with_defaults(&self, content: &str) -> Result<AppConfig> {
        let mut json_value: Value =
            serde_json::from_str(content).context("Configuration file contains invalid JSON")?;
        if !json_value.is_object() {
            return Err(anyhow!("Configuration root must be a JSON object"));
        }

        let defaults =
            serde_json::to_value(AppConfig::default()).context("Failed to serialize default configuration")?;
        let changed = fill_missing_keys(&mut json_value, &defaults);

        let config: AppConfig =
            serde_json::from_value(json_value).context("Configuration values have the wrong types")?;

        if changed {
            self.save_config(&config)
                .await
                .context("Failed to save completed configuration")?;
        }
        Ok(config)
    }

    async fn reset_corrupted(&self) -> Result<AppConfig> {
        let backup_path = self.config_path.with_extension("json.corrupted");
        if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
            warn!("Failed to create backup of corrupted config: {}", e);
        } else {
            info!("Backed up corrupted config to: {:?}", backup_path);
        }

        let default_config = AppConfig::default();
        self.save_config(&default_config)
            .await
            .context("Failed to save default configuration")?;
        info!("✅ Reset to default configuration");
        Ok(default_config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
