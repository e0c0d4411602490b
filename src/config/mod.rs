use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{NotifierError, Result};

/// Environment variable that overrides the default config file location.
pub const CONFIG_PATH_ENV: &str = "TENDER_NOTIFIER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

pub const EMAIL_ADDRESS_ENV: &str = "EMAIL_ADDRESS";
pub const EMAIL_PASSWORD_ENV: &str = "EMAIL_PASSWORD";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub sites: Vec<SiteConfig>,
    pub browser: BrowserSettings,
    pub storage: StorageSettings,
    pub email: EmailSettings,
}

/// One monitored listing page and the keywords that make a listing relevant.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SiteConfig {
    pub url: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BrowserSettings {
    pub headless: bool,
    #[serde(with = "humantime_serde")]
    pub load_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub consent_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub results_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub result_selector: String,
    pub consent_phrase: String,
    pub window_size: (u32, u32),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    pub matches_file: PathBuf,
    pub extracted_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EmailSettings {
    pub recipient: String,
    pub subject: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

/// Outgoing mail account, never stored in the config file.
#[derive(Clone)]
pub struct EmailCredentials {
    pub address: String,
    pub password: String,
}

impl EmailCredentials {
    /// Reads `EMAIL_ADDRESS` and `EMAIL_PASSWORD` through `lookup`;
    /// a missing or blank value is a `ConfigError` naming the variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(NotifierError::ConfigError(format!(
                    "Environment variable {} is not set",
                    key
                ))
                .into()),
            }
        };

        Ok(Self {
            address: read(EMAIL_ADDRESS_ENV)?,
            password: read(EMAIL_PASSWORD_ENV)?,
        })
    }
}

impl std::fmt::Debug for EmailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailCredentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sites: vec![SiteConfig {
                url: "https://www.service.bund.de/Content/DE/Ausschreibungen/Suche/Formular.html?nn=4641482&type=0&searchResult=true&view=processForm&resultsPerPage=100".to_string(),
                keywords: ["catering", "verpflegung", "lebensmittel", "kantin", "speise", "hotel", "essen"]
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
            }],
            browser: BrowserSettings::default(),
            storage: StorageSettings {
                matches_file: PathBuf::from("matches.json"),
                extracted_file: PathBuf::from("extracted_text_parts.json"),
            },
            email: EmailSettings {
                recipient: "ausschreibungen@example.org".to_string(),
                subject: "Neue Ausschreibungen verfügbar!!".to_string(),
                smtp_host: "smtp.gmail.com".to_string(),
                smtp_port: 587,
            },
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            load_timeout: Duration::from_secs(5),
            consent_timeout: Duration::from_secs(10),
            results_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_millis(250),
            result_selector: ".result-list".to_string(),
            consent_phrase: "alle akzeptieren".to_string(),
            window_size: (1920, 1080),
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Uses `TENDER_NOTIFIER_CONFIG` when set, `config.toml` otherwise.
    pub fn from_env() -> Self {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::new(path)
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully ({} site(s))", config.sites.len());
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if config.sites.is_empty() {
            return Err(NotifierError::ConfigError("Site list cannot be empty".to_string()).into());
        }

        for site in &config.sites {
            if !site.url.starts_with("http://") && !site.url.starts_with("https://") {
                return Err(NotifierError::ConfigError(format!("Site url '{}' must start with http:// or https://", site.url)).into());
            }
            if site.keywords.is_empty() {
                return Err(NotifierError::ConfigError(format!("Site '{}' has no keywords", site.url)).into());
            }
            if site.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(NotifierError::ConfigError(format!("Site '{}' has a blank keyword", site.url)).into());
            }
        }

        let browser = &config.browser;
        for (name, timeout) in [
            ("load_timeout", browser.load_timeout),
            ("consent_timeout", browser.consent_timeout),
            ("results_timeout", browser.results_timeout),
            ("poll_interval", browser.poll_interval),
        ] {
            if timeout.is_zero() {
                return Err(NotifierError::ConfigError(format!("{} must be greater than 0", name)).into());
            }
        }
        if browser.result_selector.trim().is_empty() {
            return Err(NotifierError::ConfigError("result_selector cannot be empty".to_string()).into());
        }
        if browser.consent_phrase.trim().is_empty() {
            return Err(NotifierError::ConfigError("consent_phrase cannot be empty".to_string()).into());
        }

        let email = &config.email;
        if email.recipient.trim().is_empty() || !email.recipient.contains('@') {
            return Err(NotifierError::ConfigError(format!("Invalid recipient address '{}'", email.recipient)).into());
        }
        if email.smtp_host.trim().is_empty() {
            return Err(NotifierError::ConfigError("smtp_host cannot be empty".to_string()).into());
        }
        if email.subject.trim().is_empty() {
            return Err(NotifierError::ConfigError("subject cannot be empty".to_string()).into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| NotifierError::ConfigError(format!("Failed to create config directory: {}", e)))?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| NotifierError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let config = manager.load_config().await.unwrap();

        assert_eq!(config.sites.len(), 1);
        assert!(config.sites[0].url.contains("service.bund.de"));
        assert!(config.sites[0].keywords.contains(&"verpflegung".to_string()));
        assert_eq!(config.browser.results_timeout, Duration::from_secs(20));
        assert_eq!(config.storage.matches_file, PathBuf::from("matches.json"));
        assert!(config_path.exists());
    }

    #[tokio::test]
    async fn test_save_and_reload_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let mut config = Config::default();
        config.sites[0].keywords = vec!["kantine".to_string()];
        config.browser.consent_timeout = Duration::from_millis(1500);

        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        manager.save_config(&config).await.unwrap();

        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_humantime_durations_in_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());
        manager.load_config().await.unwrap();

        let raw = std::fs::read_to_string(&config_path).unwrap();
        assert!(raw.contains("load_timeout = \"5s\""));
        assert!(raw.contains("poll_interval = \"250ms\""));
    }

    #[test]
    fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        let valid_config = Config::default();
        assert!(manager.validate_config(&valid_config).is_ok());

        let mut invalid_config = Config::default();
        invalid_config.sites.clear();
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = Config::default();
        invalid_config.sites[0].url = "ftp://example.org".to_string();
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = Config::default();
        invalid_config.sites[0].keywords.push("  ".to_string());
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = Config::default();
        invalid_config.browser.results_timeout = Duration::ZERO;
        assert!(manager.validate_config(&invalid_config).is_err());

        let mut invalid_config = Config::default();
        invalid_config.email.recipient = "nobody".to_string();
        assert!(manager.validate_config(&invalid_config).is_err());
    }

    #[test]
    fn test_credentials_from_lookup() {
        let mut env = HashMap::new();
        env.insert(EMAIL_ADDRESS_ENV, "bot@example.org".to_string());
        env.insert(EMAIL_PASSWORD_ENV, "secret".to_string());

        let creds = EmailCredentials::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(creds.address, "bot@example.org");
        assert_eq!(creds.password, "secret");
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let err = EmailCredentials::from_lookup(|_| None).unwrap_err();
        let err = err.downcast::<NotifierError>().unwrap();
        assert!(matches!(*err, NotifierError::ConfigError(ref m) if m.contains("EMAIL_ADDRESS")));

        let err = EmailCredentials::from_lookup(|k| {
            (k == EMAIL_ADDRESS_ENV).then(|| "bot@example.org".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("EMAIL_PASSWORD"));
    }
}
