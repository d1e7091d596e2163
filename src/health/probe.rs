// src/health/probe.rs
use crate::load_balancer::endpoint;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Health check timed out after {0:?}")]
    Timeout(Duration),

    #[error("Health check request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Health check returned HTTP {0}")]
    Status(StatusCode),
}

/// Out-of-band check that classifies a host as up or down.
///
/// Implementations must bound their own running time.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, address: &Url) -> Result<(), ProbeError>;
}

/// `GET <host><path>`; only HTTP 200 counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            path: path.into(),
            timeout,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, address: &Url) -> Result<(), ProbeError> {
        let url = endpoint(address, &self.path);

        let response = timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| ProbeError::Timeout(self.timeout))??;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeError::Status(status)),
        }
    }
}
