//! Configuration management for hopelink.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "hopelink";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "hopelink.db";

/// Key under which the local backend keeps the record array.
pub const DEFAULT_STORAGE_KEY: &str = "hopeLinkData";

/// Name of the cloud collection holding the records.
pub const DEFAULT_COLLECTION: &str = "patients";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `HOPELINK_`, sections split by `__`)
/// 2. TOML config file at `~/.config/hopelink/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local storage configuration.
    pub storage: StorageConfig,
    /// Cloud document store configuration.
    pub cloud: CloudConfig,
    /// Login configuration.
    pub auth: AuthConfig,
    /// AI summary configuration.
    pub summary: SummaryConfig,
}

/// Local storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/hopelink/hopelink.db`
    pub database_path: Option<PathBuf>,
    /// Key holding the JSON record array.
    pub storage_key: String,
    /// How often subscriptions check for writes from other connections.
    pub watch_interval_ms: u64,
}

/// Cloud document store configuration.
///
/// The cloud backend is used only when both `api_key` and `project_id`
/// are non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Project identifier.
    pub project_id: String,
    /// REST base URL.
    pub base_url: String,
    /// Collection holding the records.
    pub collection: String,
    /// Interval between snapshot refreshes for subscribers.
    pub poll_interval_ms: u64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

/// Login configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared password of the program administrator.
    pub admin_password: String,
    /// Centers allowed to log in, in display order.
    pub centers: Vec<CenterConfig>,
}

/// One care center and its shared password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CenterConfig {
    /// Display name, also stored on every record the center registers.
    pub name: String,
    /// Shared password for the center's staff.
    pub password: String,
}

/// AI summary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// API key for the text-generation endpoint. Empty disables summaries.
    pub api_key: String,
    /// REST base URL of the text-generation service.
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            watch_interval_ms: 500,
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            poll_interval_ms: 2_000,
            request_timeout_secs: 15,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password: "1234".to_string(),
            centers: default_centers(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 60,
        }
    }
}

/// Centers shipped with the default configuration.
fn default_centers() -> Vec<CenterConfig> {
    [
        ("광주광역시 동구 치매안심센터", "1111"),
        ("광주광역시 서구 치매안심센터", "2222"),
        ("광주광역시 남구 치매안심센터", "3333"),
        ("광주광역시 북구 치매안심센터", "4444"),
        ("광주광역시 광산구 치매안심센터", "5555"),
    ]
    .into_iter()
    .map(|(name, password)| CenterConfig {
        name: name.to_string(),
        password: password.to_string(),
    })
    .collect()
}

impl CloudConfig {
    /// Whether credentials for the cloud backend are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.project_id.trim().is_empty()
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SummaryConfig {
    /// Whether summaries can be requested at all.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AuthConfig {
    /// Look up a center by its display name.
    #[must_use]
    pub fn center(&self, name: &str) -> Option<&CenterConfig> {
        self.centers.iter().find(|c| c.name == name)
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("HOPELINK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.storage_key.trim().is_empty() {
            return Err(validation("storage_key must not be empty"));
        }

        if self.storage.watch_interval_ms == 0 {
            return Err(validation("watch_interval_ms must be greater than 0"));
        }

        if self.cloud.collection.trim().is_empty() {
            return Err(validation("cloud collection must not be empty"));
        }

        if self.cloud.poll_interval_ms == 0 {
            return Err(validation("poll_interval_ms must be greater than 0"));
        }

        if self.cloud.request_timeout_secs == 0 {
            return Err(validation("cloud request_timeout_secs must be greater than 0"));
        }

        if self.summary.request_timeout_secs == 0 {
            return Err(validation("summary request_timeout_secs must be greater than 0"));
        }

        if self.auth.admin_password.is_empty() {
            return Err(validation("admin_password must not be empty"));
        }

        let mut seen = HashSet::new();
        for center in &self.auth.centers {
            if center.name.trim().is_empty() {
                return Err(validation("center names must not be empty"));
            }
            if !seen.insert(center.name.as_str()) {
                return Err(validation(format!("duplicate center: {}", center.name)));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the watch interval as a Duration.
    #[must_use]
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.storage.watch_interval_ms)
    }
}

fn validation(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
