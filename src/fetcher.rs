//! Single-attempt retrieval of the status payload.
//!
//! A fetch never retries and never touches shared state: re-polling on the
//! next tick is the scheduler's job.

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::Url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::WatchConfig;
use crate::models::{FetchError, FetchOutcome, StatusSnapshot};

/// Anything that can produce one poll outcome.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = FetchOutcome> + Send;
}

impl<S: StatusSource> StatusSource for Arc<S> {
    fn fetch(&self) -> impl Future<Output = FetchOutcome> + Send {
        (**self).fetch()
    }
}

pub struct StatusFetcher {
    endpoint: Url,
    http_client: reqwest::Client,
}

impl StatusFetcher {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { endpoint, http_client })
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;
        Self::new(endpoint, config.request_timeout())
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl StatusSource for StatusFetcher {
    async fn fetch(&self) -> FetchOutcome {
        debug!(endpoint = %self.endpoint, "fetching server status");

        let response = self
            .http_client
            .get(self.endpoint.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "status request failed");
                FetchError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, %status, "status endpoint returned non-success");
            return Err(FetchError::Http { status: status.as_u16() });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let snapshot = decode_snapshot(&body).inspect_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "status payload rejected");
        })?;
        debug!(servers = snapshot.len(), "server status received");
        Ok(snapshot)
    }
}

/// Decodes a status payload. An empty or `null` body is the empty snapshot.
pub fn decode_snapshot(body: &[u8]) -> FetchOutcome {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StatusSnapshot::new());
    }
    let parsed: Option<StatusSnapshot> =
        serde_json::from_slice(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(parsed.unwrap_or_default())
}
