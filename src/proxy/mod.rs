//
// src/proxy/mod.rs
//
mod forwarder;
mod proxy;

pub use forwarder::{ForwardError, Forwarder, HttpForwarder, OutboundRequest};
pub use proxy::{Proxy, ProxyError, RoutingMode};
