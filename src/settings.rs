use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use dotenv::dotenv;
use std::{env, fmt, str::FromStr, time::Duration};
use zeroize::Zeroizing;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Production,
    Testing,
}

impl FromStr for AppEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" => Ok(AppEnvironment::Development),
            "production" => Ok(AppEnvironment::Production),
            "testing" => Ok(AppEnvironment::Testing),
            _ => Err(ConfigError::Message(format!("Invalid environment: {}", s))),
        }
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    #[serde(default = "default_env")]
    pub env: AppEnvironment,

    #[serde(default = "default_name")]
    pub name: String,

    /// Base URL of the metadata backend (`/projects/{id}/images` etc).
    #[serde(default)]
    pub api_base_url: String,

    /// Base URL of the blob store front.
    #[serde(default)]
    pub storage_base_url: String,

    /// Base URL of the OCR/analysis service.
    #[serde(default)]
    pub recognition_base_url: String,

    /// API key for the recognition service. Backend bearer tokens are NOT
    /// configured here; they come fresh from the `TokenProvider` per call.
    #[serde(default)]
    pub recognition_api_key: String,

    /// Confirmation window for scan/analysis requests, humantime syntax.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: String,

    /// Fixed interval between stream reconnection attempts.
    #[serde(default = "default_stream_retry_interval")]
    pub stream_retry_interval: String,

    /// Lifetime requested for signed display URLs.
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_env() -> AppEnvironment {
    AppEnvironment::Development
}
fn default_name() -> String {
    "Invoice-Sync-Engine".to_string()
}
fn default_operation_timeout() -> String {
    "60s".to_string()
}
fn default_stream_retry_interval() -> String {
    "5s".to_string()
}
fn default_signed_url_ttl() -> String {
    "1h".to_string()
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl EngineConfig {
    pub fn new() -> Result<Self, ConfigError> {
        dotenv().ok();

        let raw_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        let env_name = AppEnvironment::from_str(&raw_env)
            .map_err(|_| ConfigError::Message(format!("Invalid APP_ENV value: {}", raw_env)))?;

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env_name.to_string().to_lowercase())).required(false))
            .add_source(Environment::with_prefix("APP").separator("_").ignore_empty(true));

        let mut config: Self = builder.build()?.try_deserialize()?;

        config.env = env_name;

        // Inject critical env values if missing
        config.api_base_url = fill_or_env(config.api_base_url, "APP_API_BASE_URL")?;
        config.storage_base_url = fill_or_env(config.storage_base_url, "APP_STORAGE_BASE_URL")?;
        config.recognition_base_url =
            fill_or_env(config.recognition_base_url, "APP_RECOGNITION_BASE_URL")?;

        if config.recognition_api_key.trim().is_empty() {
            if let Ok(key) = env::var("APP_RECOGNITION_API_KEY") {
                config.recognition_api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (label, value) in [
            ("API_BASE_URL", &self.api_base_url),
            ("STORAGE_BASE_URL", &self.storage_base_url),
            ("RECOGNITION_BASE_URL", &self.recognition_base_url),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} cannot be empty", label));
            } else if url::Url::parse(value).is_err() {
                errors.push(format!("{} is not a valid URL", label));
            }
        }
        for (label, value) in [
            ("OPERATION_TIMEOUT", &self.operation_timeout),
            ("STREAM_RETRY_INTERVAL", &self.stream_retry_interval),
            ("SIGNED_URL_TTL", &self.signed_url_ttl),
        ] {
            if humantime::parse_duration(value).is_err() {
                errors.push(format!("{} is not a valid duration", label));
            }
        }
        if self.max_upload_bytes == 0 {
            errors.push("MAX_UPLOAD_BYTES must be positive".to_string());
        }
        if self.is_production() && self.recognition_api_key.trim().is_empty() {
            errors.push("RECOGNITION_API_KEY must be set in production".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Message(errors.join(", ")))
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnvironment::Production
    }

    pub fn operation_timeout(&self) -> Duration {
        parse_duration_or(&self.operation_timeout, Duration::from_secs(60))
    }

    pub fn stream_retry_interval(&self) -> Duration {
        parse_duration_or(&self.stream_retry_interval, Duration::from_secs(5))
    }

    pub fn signed_url_ttl(&self) -> Duration {
        parse_duration_or(&self.signed_url_ttl, Duration::from_secs(3600))
    }

    pub fn recognition_api_key(&self) -> Zeroizing<String> {
        Zeroizing::new(self.recognition_api_key.clone())
    }
}

// Validated on load; the fallback only covers hand-built test configs.
fn parse_duration_or(value: &str, fallback: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(fallback)
}

fn fill_or_env(current: String, env_key: &str) -> Result<String, ConfigError> {
    if current.trim().is_empty() {
        env::var(env_key).map_err(|_| ConfigError::Message(format!("{env_key} must be set")))
    } else {
        Ok(current)
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Production => "production",
            AppEnvironment::Testing => "testing",
        };
        write!(f, "{s}")
    }
}

trait Redact {
    fn redact(&self) -> &str;
}

impl Redact for str {
    fn redact(&self) -> &str {
        if self.is_empty() {
            "[MISSING]"
        } else {
            "[REDACTED]"
        }
    }
}

impl Redact for String {
    fn redact(&self) -> &str {
        self.as_str().redact()
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("env", &self.env)
            .field("name", &self.name)
            .field("api_base_url", &self.api_base_url)
            .field("storage_base_url", &self.storage_base_url)
            .field("recognition_base_url", &self.recognition_base_url)
            .field("recognition_api_key", &self.recognition_api_key.redact())
            .field("operation_timeout", &self.operation_timeout)
            .field("stream_retry_interval", &self.stream_retry_interval)
            .field("signed_url_ttl", &self.signed_url_ttl)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}
