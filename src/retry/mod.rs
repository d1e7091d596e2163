// src/retry/mod.rs
mod failover;

pub use failover::{FailoverError, FailoverPolicy};
