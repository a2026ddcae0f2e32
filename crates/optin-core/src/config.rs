//! Bot configuration.
//!
//! The configuration document is JSON (camelCase keys accepted alongside
//! snake_case) with three sections: credentials, api_keys and settings.
//! Out-of-range settings are clamped rather than rejected.

use crate::credentials::{Credentials, Phone};
use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Name of the file whose presence requests a graceful stop.
pub const STOP_SIGNAL_FILE: &str = "stop_signal.txt";

/// Where URLs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// A CSV file with a `url` column
    Csv,
    /// An external ad-library scraper feeding the queue
    Meta,
    /// The scraped-URL queue in the database
    Database,
}

impl Default for DataSource {
    fn default() -> Self {
        Self::Meta
    }
}

/// Credentials section of the config document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// First name
    #[serde(alias = "firstName")]
    pub first_name: String,
    /// Last name
    #[serde(alias = "lastName")]
    pub last_name: String,
    /// Email address
    pub email: String,
    /// Default dial code, e.g. "+1"
    #[serde(alias = "countryCode")]
    pub country_code: String,
    /// National phone number
    pub phone: String,
}

impl CredentialsConfig {
    /// Build the immutable per-run credentials.
    #[must_use]
    pub fn to_credentials(&self) -> Credentials {
        let country_code = if self.country_code.is_empty() {
            "+1".to_string()
        } else {
            self.country_code.clone()
        };
        Credentials {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            phone: Phone {
                country_code,
                number: self.phone.clone(),
            },
        }
    }
}

/// API keys section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    /// LLM endpoint key
    pub openai: String,
    /// CAPTCHA solving service key (empty = no solver)
    pub captcha: String,
}

impl ApiKeys {
    /// The solver key, or `None` when no solver is configured.
    #[must_use]
    pub fn captcha_key(&self) -> Option<&str> {
        if self.captcha.trim().is_empty() {
            None
        } else {
            Some(self.captcha.as_str())
        }
    }
}

/// Behaviour settings with clamped ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// URL source
    #[serde(alias = "dataSource")]
    pub data_source: DataSource,
    /// Path to the CSV file when `data_source` is csv
    #[serde(alias = "csvPath")]
    pub csv_path: String,
    /// Keywords for the external scraper
    #[serde(alias = "metaKeywords")]
    pub meta_keywords: String,
    /// Ads to scrape per run (5–100)
    #[serde(alias = "adLimit")]
    pub ad_limit: i64,
    /// Successful signups before the run stops (1–100)
    #[serde(alias = "maxSignups")]
    pub max_signups: i64,
    /// Run the browser headless
    pub headless: bool,
    /// Verbose debug logging
    pub debug: bool,
    /// Emit per-step detail lines
    #[serde(alias = "detailedLogs")]
    pub detailed_logs: bool,
    /// Minimum inter-URL delay in seconds (5–60)
    #[serde(alias = "minDelay")]
    pub min_delay: i64,
    /// Maximum inter-URL delay in seconds (10–120)
    #[serde(alias = "maxDelay")]
    pub max_delay: i64,
    /// Chat model name
    #[serde(alias = "llmModel")]
    pub llm_model: String,
    /// Plan the whole form from one HTML snapshot instead of stepwise
    #[serde(alias = "batchPlanning")]
    pub batch_planning: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_source: DataSource::default(),
            csv_path: String::new(),
            meta_keywords: "marketing, funnel".to_string(),
            ad_limit: 20,
            max_signups: 30,
            headless: false,
            debug: false,
            detailed_logs: false,
            min_delay: 10,
            max_delay: 30,
            llm_model: "gpt-4o-mini".to_string(),
            batch_planning: true,
        }
    }
}

impl Settings {
    /// Clamp every ranged value into its valid interval.
    pub fn clamp_ranges(&mut self) {
        self.ad_limit = self.ad_limit.clamp(5, 100);
        self.max_signups = self.max_signups.clamp(1, 100);
        self.min_delay = self.min_delay.clamp(5, 60);
        self.max_delay = self.max_delay.clamp(10, 120);
        if self.llm_model.trim().is_empty() {
            self.llm_model = "gpt-4o-mini".to_string();
        }
    }
}

/// Complete bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Signup credentials
    pub credentials: CredentialsConfig,
    /// API keys
    #[serde(alias = "apiKeys")]
    pub api_keys: ApiKeys,
    /// Behaviour settings
    pub settings: Settings,
}

impl BotConfig {
    /// Load configuration from a JSON file, clamping ranged settings.
    ///
    /// # Errors
    /// Returns error if the file is missing or not valid JSON.
    pub fn load(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(&path)?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string, clamping ranged settings.
    ///
    /// # Errors
    /// Returns error on malformed JSON.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.settings.clamp_ranges();
        Ok(config)
    }

    /// Save configuration to a JSON file.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the file written.
    pub fn save(&self, path: impl Into<PathBuf>) -> ConfigResult<()> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        Ok(())
    }

    /// Platform app-data directory (Roaming AppData / Application Support /
    /// XDG data, under the application identifier). Created if missing.
    ///
    /// # Errors
    /// Returns error if the platform directories cannot be determined.
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "optin", "optin").ok_or(ConfigError::NoDataDir)?;
        let dir = dirs.data_dir().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of the stop-signal file inside the app-data directory.
    ///
    /// # Errors
    /// Returns error if the app-data directory cannot be determined.
    pub fn stop_signal_path() -> ConfigResult<PathBuf> {
        Ok(Self::data_dir()?.join(STOP_SIGNAL_FILE))
    }

    /// Default SQLite database path inside the app-data directory.
    ///
    /// # Errors
    /// Returns error if the app-data directory cannot be determined.
    pub fn default_db_path() -> ConfigResult<PathBuf> {
        Ok(Self::data_dir()?.join("optin.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.settings.max_signups, 30);
        assert_eq!(config.settings.ad_limit, 20);
        assert_eq!(config.settings.llm_model, "gpt-4o-mini");
        assert!(config.settings.batch_planning);
        assert!(!config.settings.headless);
        assert!(config.api_keys.captcha_key().is_none());
    }

    #[test]
    fn test_camel_case_aliases() {
        let json = r#"{
            "credentials": {"firstName": "Jane", "lastName": "Doe", "email": "j@d.com", "countryCode": "+44", "phone": "7700900123"},
            "apiKeys": {"openai": "sk-test", "captcha": "cap-key"},
            "settings": {"dataSource": "csv", "csvPath": "urls.csv", "maxSignups": 5, "llmModel": "gpt-4o", "batchPlanning": false}
        }"#;
        let config = BotConfig::from_json(json).expect("parse config");
        assert_eq!(config.credentials.first_name, "Jane");
        assert_eq!(config.settings.data_source, DataSource::Csv);
        assert_eq!(config.settings.max_signups, 5);
        assert_eq!(config.settings.llm_model, "gpt-4o");
        assert!(!config.settings.batch_planning);
        assert_eq!(config.api_keys.captcha_key(), Some("cap-key"));
    }

    #[test]
    fn test_clamping() {
        let json = r#"{"settings": {"adLimit": 1000, "maxSignups": 0, "minDelay": 1, "maxDelay": 500}}"#;
        let config = BotConfig::from_json(json).expect("parse config");
        assert_eq!(config.settings.ad_limit, 100);
        assert_eq!(config.settings.max_signups, 1);
        assert_eq!(config.settings.min_delay, 5);
        assert_eq!(config.settings.max_delay, 120);
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let mut settings = Settings {
            ad_limit: -3,
            ..Settings::default()
        };
        settings.clamp_ranges();
        let once = settings.clone();
        settings.clamp_ranges();
        assert_eq!(once.ad_limit, settings.ad_limit);
        assert_eq!(settings.ad_limit, 5);
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::TempDir::new().expect("temp dir");
        let path = tmp.path().join("bot_config.json");

        let mut config = BotConfig::default();
        config.credentials.email = "x@y.z".to_string();
        config.save(&path).expect("save config");

        let loaded = BotConfig::load(&path).expect("load config");
        assert_eq!(loaded.credentials.email, "x@y.z");
    }

    #[test]
    fn test_missing_file() {
        let err = BotConfig::load("/nonexistent/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_credentials_conversion_defaults_country() {
        let config = CredentialsConfig {
            phone: "2025550123".to_string(),
            ..CredentialsConfig::default()
        };
        let creds = config.to_credentials();
        assert_eq!(creds.phone.dial_code(), "1");
    }
}
