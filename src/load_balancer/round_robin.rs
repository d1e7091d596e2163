// src/load_balancer/round_robin.rs
use crate::load_balancer::{Host, HostSelector};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum RotatorError {
    #[error("No hosts configured")]
    EmptyPool,

    #[error("Host {0} is configured more than once")]
    DuplicateHost(Url),
}

/// Host table plus the cursor into it. Only ever touched under the
/// rotator's lock.
#[derive(Debug)]
struct RotationState {
    hosts: Vec<Host>,
    index: usize,
}

/// Thread-safe round-robin over a fixed host pool.
///
/// A single lock guards both the cursor and every host's health fields, so
/// any read-then-write over them is atomic. The lock is never held across
/// I/O: callers select, release, and only then talk to the network.
#[derive(Debug)]
pub struct Rotator {
    state: Mutex<RotationState>,
    len: usize,
}

impl Rotator {
    /// Builds the pool. An empty or duplicated host list is a configuration
    /// error, which keeps `0 <= index < len` true for every later call.
    pub fn new(addresses: Vec<Url>) -> Result<Self, RotatorError> {
        if addresses.is_empty() {
            return Err(RotatorError::EmptyPool);
        }

        let mut seen = HashSet::with_capacity(addresses.len());
        for address in &addresses {
            if !seen.insert(address.as_str()) {
                return Err(RotatorError::DuplicateHost(address.clone()));
            }
        }

        let hosts: Vec<Host> = addresses.into_iter().map(Host::new).collect();
        let len = hosts.len();

        Ok(Self {
            state: Mutex::new(RotationState { hosts, index: 0 }),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: construction rejects an empty pool.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub async fn select_next(&self) -> Url {
        let mut state = self.state.lock().await;
        let selected = state.hosts[state.index].address().clone();
        state.index = (state.index + 1) % self.len;
        selected
    }

    /// Scans at most `len` positions starting at the cursor. On a hit the
    /// cursor is left just past the returned host; on a miss it has wrapped
    /// back to where it started.
    pub async fn select_next_healthy(&self) -> Option<Url> {
        let mut state = self.state.lock().await;
        for _ in 0..self.len {
            let current = state.index;
            state.index = (current + 1) % self.len;
            if state.hosts[current].healthy {
                return Some(state.hosts[current].address().clone());
            }
        }
        None
    }

    pub async fn mark_health(&self, address: &Url, healthy: bool) {
        let mut state = self.state.lock().await;
        if let Some(host) = state.hosts.iter_mut().find(|h| h.address() == address) {
            let was_healthy = host.healthy;
            host.record_check(healthy);
            if was_healthy != healthy {
                tracing::info!(
                    host = %address,
                    healthy,
                    "Host health changed"
                );
            }
        } else {
            tracing::debug!(host = %address, "Ignoring health report for unknown host");
        }
    }

    /// Addresses in pool order, copied out so probes can run unlocked.
    pub async fn addresses(&self) -> Vec<Url> {
        let state = self.state.lock().await;
        state.hosts.iter().map(|h| h.address().clone()).collect()
    }

    pub async fn snapshot(&self) -> Vec<Host> {
        self.state.lock().await.hosts.clone()
    }

    pub async fn healthy_count(&self) -> usize {
        let state = self.state.lock().await;
        state.hosts.iter().filter(|h| h.healthy).count()
    }
}

#[async_trait]
impl HostSelector for Rotator {
    fn pool_size(&self) -> usize {
        self.len
    }

    async fn select_next(&self) -> Url {
        Rotator::select_next(self).await
    }

    async fn select_next_healthy(&self) -> Option<Url> {
        Rotator::select_next_healthy(self).await
    }

    async fn mark_health(&self, address: &Url, healthy: bool) {
        Rotator::mark_health(self, address, healthy).await
    }

    async fn healthy_count(&self) -> usize {
        Rotator::healthy_count(self).await
    }
}
