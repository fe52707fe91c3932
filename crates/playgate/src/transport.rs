// Probe transport: a single bounded request telling whether a URL answers.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;

use crate::{HttpConfig, PlaygateError, client::create_client};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("Endpoint answered with status {0}")]
    Status(StatusCode),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Issue one lightweight request. `Ok` means an HTTP-success-class answer.
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), ProbeError>;
}

/// HEAD-based probe over reqwest
#[derive(Debug, Clone)]
pub struct HttpProbeTransport {
    http_client: Client,
}

impl HttpProbeTransport {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, PlaygateError> {
        Ok(Self::new(create_client(config)?))
    }
}

#[async_trait]
impl ProbeTransport for HttpProbeTransport {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<(), ProbeError> {
        let response = self
            .http_client
            .head(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Request(e)
                }
            })?;

        let status = response.status();
        trace!(url, %status, "Probe answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }
}
