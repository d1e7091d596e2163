// src/load_balancer/mod.rs
mod algorithm;
mod host;
mod round_robin;

pub use algorithm::HostSelector;
pub use host::{endpoint, Host, RETRY_AFTER};
pub use round_robin::{Rotator, RotatorError};
