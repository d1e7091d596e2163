// src/retry/failover.rs

use crate::load_balancer::HostSelector;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FailoverError {
    #[error("No healthy hosts available")]
    NoHealthyHost,

    #[error("All {attempts} attempts failed")]
    Exhausted { attempts: usize },
}

/// Where one pass of the failover loop ended up.
#[derive(Debug)]
enum Attempt<T> {
    Succeeded(T),
    Failed,
    NoTarget,
}

/// Bounded retry across hosts: one attempt per host in the pool, each one on
/// the next healthy host. A host whose attempt fails is marked down before
/// moving on. No backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct FailoverPolicy {
    max_attempts: usize,
}

impl FailoverPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts }
    }

    pub fn for_pool(selector: &dyn HostSelector) -> Self {
        Self::new(selector.pool_size())
    }

    /// Returns the first successful result. Fails with `NoHealthyHost` as soon
    /// as the selector has nothing healthy to offer.
    pub async fn execute<F, Fut, T, E>(
        &self,
        selector: &dyn HostSelector,
        mut attempt: F,
    ) -> Result<T, FailoverError>
    where
        F: FnMut(Url) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        for number in 1..=self.max_attempts {
            let outcome = match selector.select_next_healthy().await {
                None => Attempt::NoTarget,
                Some(target) => match attempt(target.clone()).await {
                    Ok(result) => Attempt::Succeeded(result),
                    Err(error) => {
                        warn!(
                            host = %target,
                            attempt = number,
                            error = %error,
                            "Forward failed, marking host unhealthy"
                        );
                        selector.mark_health(&target, false).await;
                        Attempt::Failed
                    }
                },
            };

            match outcome {
                Attempt::Succeeded(result) => return Ok(result),
                Attempt::NoTarget => return Err(FailoverError::NoHealthyHost),
                Attempt::Failed => {
                    debug!("Attempt {} of {} failed", number, self.max_attempts);
                }
            }
        }

        Err(FailoverError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
