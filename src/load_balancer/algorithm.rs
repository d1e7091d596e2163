// src/load_balancer/algorithm.rs
use async_trait::async_trait;
use url::Url;

/// Selection and health-reporting surface the dispatcher routes through.
#[async_trait]
pub trait HostSelector: Send + Sync {
    /// Number of hosts in the pool. Fixed for the selector's lifetime.
    fn pool_size(&self) -> usize;

    /// Unconditional round-robin.
    async fn select_next(&self) -> Url;

    /// Round-robin over hosts currently marked healthy.
    async fn select_next_healthy(&self) -> Option<Url>;

    /// Record a health observation. Unknown addresses are ignored.
    async fn mark_health(&self, address: &Url, healthy: bool);

    async fn healthy_count(&self) -> usize;
}
