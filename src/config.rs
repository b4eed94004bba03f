use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::{OutputValidation, RetryPolicy};
use crate::error::{AppError, Result};
use crate::feed::FeedSources;
use crate::models::SampleLimits;

const APP_DIR: &str = "ask-your-mother";
const LOCAL_CONFIG: &str = "digest.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_store_uri")]
    pub store_uri: String,

    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    pub email_sender: Option<String>,
    pub email_password: Option<String>,
    /// Safe-mode recipient; falls back to the sender address.
    pub admin_email: Option<String>,
    /// Feedback link target; falls back to the admin address.
    pub feedback_email: Option<String>,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default = "default_unsubscribe_url")]
    pub unsubscribe_url: String,

    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default)]
    pub sources: FeedSources,

    #[serde(default)]
    pub sample_limits: SampleLimits,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub output_validation: OutputValidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default)]
    pub jitter_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            jitter_secs: 0,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts,
            base_delay: Duration::from_secs(settings.base_delay_secs),
            jitter: Duration::from_secs(settings.jitter_secs),
        }
    }
}

/// Credentials the pipeline cannot run without.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub email_sender: String,
    pub email_password: String,
}

/// Who receives this run's digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Admin address only.
    Safe,
    /// Every active subscriber.
    Live,
}

impl DeliveryMode {
    pub fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("live") => DeliveryMode::Live,
            _ => DeliveryMode::Safe,
        }
    }

    pub fn from_env() -> Self {
        Self::from_value(std::env::var("DIGEST_MODE").ok().as_deref())
    }
}

fn default_store_uri() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("digest.db").to_string_lossy().to_string()
}

fn default_gemini_model() -> String {
    "gemini-flash-latest".to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

fn default_unsubscribe_url() -> String {
    "https://askyourmother.streamlit.app/".to_string()
}

fn default_window_days() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_uri: default_store_uri(),
            gemini_api_key: None,
            gemini_model: default_gemini_model(),
            email_sender: None,
            email_password: None,
            admin_email: None,
            feedback_email: None,
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            unsubscribe_url: default_unsubscribe_url(),
            window_days: default_window_days(),
            sources: FeedSources::default(),
            sample_limits: SampleLimits::default(),
            retry: RetrySettings::default(),
            output_validation: OutputValidation::default(),
        }
    }
}

impl Config {
    /// Load the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::existing_config_path() {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                toml::from_str(&content)?
            }
            None => {
                let config = Config::default();
                if let Err(e) = config.save() {
                    tracing::warn!("Could not write default config: {}", e);
                }
                config
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    fn existing_config_path() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("DIGEST_CONFIG") {
            return Some(PathBuf::from(explicit));
        }
        [PathBuf::from(LOCAL_CONFIG), Self::config_path()]
            .into_iter()
            .find(|p| p.exists())
    }

    /// Environment values win over the file for secrets and locations.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = get("GEMINI_API_KEY").or_else(|| get("GOOGLE_API_KEY")) {
            self.gemini_api_key = Some(key);
        }
        if let Some(sender) = get("EMAIL_SENDER") {
            self.email_sender = Some(sender);
        }
        if let Some(password) = get("EMAIL_PASSWORD") {
            self.email_password = Some(password);
        }
        if let Some(uri) = get("DIGEST_STORE_URI") {
            self.store_uri = uri;
        }
        if let Some(admin) = get("ADMIN_EMAIL") {
            self.admin_email = Some(admin);
        }
    }

    /// Fail fast when a credential is missing.
    pub fn require_secrets(&self) -> Result<Secrets> {
        fn present(value: &Option<String>, name: &'static str) -> Result<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(AppError::MissingSecret(name))
        }

        Ok(Secrets {
            gemini_api_key: present(&self.gemini_api_key, "gemini_api_key")?,
            email_sender: present(&self.email_sender, "email_sender")?,
            email_password: present(&self.email_password, "email_password")?,
        })
    }

    pub fn admin_address(&self) -> Option<&str> {
        self.admin_email
            .as_deref()
            .or(self.email_sender.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn feedback_address(&self) -> &str {
        self.feedback_email
            .as_deref()
            .or(self.admin_address())
            .unwrap_or_default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }
}
