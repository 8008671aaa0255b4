//! Process configuration.
//!
//! Loaded once at startup from a TOML file, optionally overridden from the
//! environment, validated, then shared read-only (usually behind an `Arc`).

use crate::errors::ConfigError;
use crate::pipeline::{BackoffPolicy, StepRetryPolicy};
use chrono::Datelike;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`ApiConfig::base_url`].
pub const ENV_API_BASE_URL: &str = "DSFLOW_API_BASE_URL";
/// Environment variable overriding [`ApiConfig::auth_token`].
pub const ENV_API_TOKEN: &str = "DSFLOW_API_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Metadata API access.
    pub api: ApiConfig,
    /// Filesystem roots.
    pub paths: PathsConfig,
    /// Default step retry parameters.
    pub steps: StepDefaults,
    /// Logging setup.
    pub logging: LoggingConfig,
}

/// Metadata API connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is joined to.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub auth_token: String,
    /// TCP connect timeout in seconds.
    pub conn_timeout_secs: u64,
    /// Per-request read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Transport-level retry.
    pub retry: HttpRetryConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3030".to_string(),
            auth_token: String::new(),
            conn_timeout_secs: 5,
            read_timeout_secs: 60,
            retry: HttpRetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &"<redacted>")
            .field("conn_timeout_secs", &self.conn_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ApiConfig {
    /// Returns the connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }

    /// Returns the read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Parses the base URL, ensuring it ends with `/` so relative paths
    /// are appended rather than replacing the last segment.
    pub fn parsed_base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.base_url.trim();
        if raw.is_empty() {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: "must not be empty".to_string(),
            });
        }
        let mut url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
            field: "api.base_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Transport-level retry parameters of the API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Retries after the initial request.
    pub total_retries: u32,
    /// Backoff factor in seconds.
    pub backoff_factor_secs: u64,
    /// Cap on a single backoff wait in seconds.
    pub backoff_max_secs: u64,
    /// Response statuses that are retried.
    pub status_forcelist: Vec<u16>,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            total_retries: 9,
            backoff_factor_secs: 5,
            backoff_max_secs: 120,
            status_forcelist: vec![429, 502, 503],
        }
    }
}

impl HttpRetryConfig {
    /// Returns the backoff schedule: first retry immediate, then exponential.
    #[must_use]
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::http(
            Duration::from_secs(self.backoff_factor_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

/// Filesystem roots used by step bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Scratch space for in-flight work.
    pub scratch: PathBuf,
    /// Archive root. Contains the archiving year so old data can be purged by year.
    pub archive: PathBuf,
    /// Staging area.
    pub stage: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch: PathBuf::from("scratch"),
            archive: PathBuf::from(format!("archive/{}", chrono::Utc::now().year())),
            stage: PathBuf::from("scratch/stage"),
        }
    }
}

/// Default step retry parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepDefaults {
    /// Re-attempts after the first call.
    pub max_retries: u32,
    /// Base delay in seconds.
    pub retry_delay_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

impl StepDefaults {
    /// Applies these defaults to `policy`.
    #[must_use]
    pub fn apply(&self, policy: StepRetryPolicy) -> StepRetryPolicy {
        policy
            .with_max_retries(self.max_retries)
            .with_retry_delay(Duration::from_secs(self.retry_delay_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,dsflow=debug".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads, parses, applies environment overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&data)?.with_env_overrides();
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses TOML. Missing fields take their defaults.
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }

    /// Applies `DSFLOW_API_BASE_URL` and `DSFLOW_API_TOKEN`.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api.auth_token = token;
        }
        self
    }

    /// Rejects configurations the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.parsed_base_url()?;
        if self.api.conn_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "api.conn_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.api.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "api.read_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.api.retry.backoff_max_secs < self.api.retry.backoff_factor_secs {
            return Err(ConfigError::Invalid {
                field: "api.retry.backoff_max_secs",
                reason: "must not be smaller than backoff_factor_secs".to_string(),
            });
        }
        Ok(())
    }
}
