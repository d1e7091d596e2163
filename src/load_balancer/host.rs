// src/load_balancer/host.rs
use chrono::{DateTime, Utc};
use std::time::Duration;
use url::Url;

/// How long a host that was marked down is remembered as down before it
/// may be reconsidered. Recorded only; selection does not consult it.
pub const RETRY_AFTER: Duration = Duration::from_secs(10);

/// `path` appended to the host's base path, so a host configured as
/// `http://h:p/api` is reached at `http://h:p/api/echo`.
pub fn endpoint(address: &Url, path: &str) -> Url {
    let mut url = address.clone();
    let joined = format!(
        "{}/{}",
        address.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

/// One backend instance in the host pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    address: Url,
    pub healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub retry_after: Duration,
}

impl Host {
    /// Hosts start healthy; the first monitor tick corrects that if needed.
    pub fn new(address: Url) -> Self {
        Self {
            address,
            healthy: true,
            last_checked_at: None,
            retry_after: Duration::ZERO,
        }
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    pub(crate) fn record_check(&mut self, healthy: bool) {
        self.healthy = healthy;
        self.last_checked_at = Some(Utc::now());
        if !healthy {
            self.retry_after = RETRY_AFTER;
        }
    }
}
