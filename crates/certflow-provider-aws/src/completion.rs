//! Completion callback delivery
//!
//! The callback URL is a pre-signed object-store URL: the body is sent with
//! `PUT` and an empty content type, which is what the signature covers.
//! The URL is a credential and never appears in logs or errors.

use async_trait::async_trait;
use certflow_core::event::CompletionResponse;
use certflow_core::traits::CompletionSink;
use certflow_core::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Default HTTP timeout for completion delivery (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers completion signals with one HTTP `PUT`
#[derive(Debug, Clone)]
pub struct HttpCompletionSink {
    client: reqwest::Client,
}

impl HttpCompletionSink {
    /// Create a sink with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a sink with an explicit timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CompletionSink for HttpCompletionSink {
    async fn send(&self, url: &str, response: &CompletionResponse) -> Result<()> {
        let body = serde_json::to_vec(response)?;
        let reply = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::http(format!("completion delivery failed: {}", e.without_url())))?;

        let status = reply.status();
        if !status.is_success() {
            return Err(Error::http(format!(
                "completion endpoint answered {}",
                status
            )));
        }
        debug!(status = %status, "Completion delivered");
        Ok(())
    }
}
