//! Bot configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{InputSource, ScanSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub chat: ChatSettings,
    /// Capture settings, fixed for the life of the process.
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    /// Session expiry tuning.
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

impl ServerSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Telegram bot API token. Required; the daemon refuses to start
    /// without one.
    #[serde(default)]
    pub api_key: String,
    /// Usernames allowed to drive the scanner. Everyone else is ignored.
    #[serde(default)]
    pub authorized_users: Vec<String>,
    /// Send the assembled document back into the chat after finalize.
    #[serde(default = "ChatSettings::default_send_document")]
    pub send_document: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            authorized_users: Vec::new(),
            send_document: Self::default_send_document(),
        }
    }
}

impl ChatSettings {
    fn default_send_document() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Pin selection to one advertised scanner name. Empty means the first
    /// idle scanner in discovery order.
    #[serde(default)]
    pub device_override: String,
    /// `platen` or `feeder`. Anything else is rejected at startup.
    #[serde(default)]
    pub input_source: InputSource,
    #[serde(default = "ScanConfig::default_color_mode")]
    pub color_mode: String,
    #[serde(default = "ScanConfig::default_document_format")]
    pub document_format: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            device_override: String::new(),
            input_source: InputSource::default(),
            color_mode: Self::default_color_mode(),
            document_format: Self::default_document_format(),
        }
    }
}

impl ScanConfig {
    fn default_color_mode() -> String {
        "RGB24".to_string()
    }

    fn default_document_format() -> String {
        "image/jpeg".to_string()
    }

    pub fn settings(&self) -> ScanSettings {
        ScanSettings {
            color_mode: self.color_mode.clone(),
            input_source: self.input_source,
            document_format: self.document_format.clone(),
        }
    }

    pub fn override_name(&self) -> Option<&str> {
        if self.device_override.is_empty() {
            None
        } else {
            Some(&self.device_override)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Spool directory for per-page files of in-progress sessions.
    #[serde(default = "StorageSettings::default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Destination directory for assembled documents.
    #[serde(default = "StorageSettings::default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            tmp_dir: Self::default_tmp_dir(),
            output_dir: Self::default_output_dir(),
        }
    }
}

impl StorageSettings {
    fn default_tmp_dir() -> PathBuf {
        std::env::temp_dir().join("scandesk")
    }

    fn default_output_dir() -> PathBuf {
        if let Some(data_dir) = dirs::data_local_dir() {
            data_dir.join("scandesk").join("scans")
        } else {
            PathBuf::from("/var/lib/scandesk/scans")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Sessions idle for longer than this are reaped.
    #[serde(default = "SessionSettings::default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// How often the reaper wakes.
    #[serde(default = "SessionSettings::default_reap_interval")]
    pub reap_interval_secs: u64,
    /// Concurrent session cap. One shared scanner means one session.
    #[serde(default = "SessionSettings::default_max_active")]
    pub max_active: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: Self::default_idle_timeout(),
            reap_interval_secs: Self::default_reap_interval(),
            max_active: Self::default_max_active(),
        }
    }
}

impl SessionSettings {
    fn default_idle_timeout() -> u64 {
        300
    }

    fn default_reap_interval() -> u64 {
        60
    }

    fn default_max_active() -> usize {
        1
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl BotConfig {
    /// Load configuration from the specified path, or the first standard
    /// location that exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/scandesk/bot.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BotConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or fall back to defaults if no file is found.
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("scandesk").join("bot.toml")
        } else {
            PathBuf::from(".config/scandesk/bot.toml")
        }
    }

    /// Validate configuration values. Failures here are fatal at startup;
    /// nothing else is.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.chat.api_key.is_empty() {
            return Err(anyhow!("chat.api_key is not set; the bot cannot start without credentials"));
        }

        if self.chat.authorized_users.is_empty() {
            return Err(anyhow!(
                "chat.authorized_users is empty; nobody would be able to use the scanner"
            ));
        }

        if self.session.idle_timeout_secs == 0 || self.session.reap_interval_secs == 0 {
            return Err(anyhow!("session timeouts must be greater than zero"));
        }

        if self.session.max_active == 0 {
            return Err(anyhow!("session.max_active must be at least 1"));
        }

        Ok(())
    }
}

/// Expand a user-supplied config path (tilde and environment variables).
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
