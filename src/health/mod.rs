// src/health/mod.rs
mod checker;
mod probe;

pub use checker::{HealthCheckSummary, HealthMonitor};
pub use probe::{HealthProbe, HttpProbe, ProbeError};
