// src/config/models.rs
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    pub hosts: Vec<Url>,

    #[serde(with = "super::duration")]
    pub health_check_interval: Duration,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub forward: ForwardConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_health_path")]
    pub path: String,

    #[serde(default = "default_health_timeout", with = "super::duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForwardConfig {
    #[serde(default = "default_forward_path")]
    pub path: String,

    #[serde(default = "default_forward_timeout", with = "super::duration")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_forward_path() -> String {
    "/echo".to_string()
}

fn default_forward_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            timeout: default_health_timeout(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            path: default_forward_path(),
            timeout: default_forward_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            bail!("at least one host must be configured");
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if !matches!(host.scheme(), "http" | "https") {
                bail!("host {} must use http or https", host);
            }
            if !seen.insert(host.as_str()) {
                bail!("host {} is listed more than once", host);
            }
        }

        if self.health_check_interval.is_zero() {
            bail!("health_check_interval must be greater than zero");
        }
        if self.health_check.timeout.is_zero() || self.forward.timeout.is_zero() {
            bail!("timeouts must be greater than zero");
        }

        Ok(())
    }
}
