use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub endpoint_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub api_port: Option<u16>,
}

fn default_poll_interval_ms() -> u64 { 30_000 }
fn default_request_timeout_ms() -> u64 { 10_000 }

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid endpoint_url {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("endpoint_url must use http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
    #[error("request_timeout_ms must be greater than zero")]
    ZeroRequestTimeout,
}

impl WatchConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            api_port: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: WatchConfig = serde_json::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ZeroRequestTimeout);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint_url).map_err(|e| ConfigError::InvalidEndpoint {
            url: self.endpoint_url.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
