// ────────────────────────────────
// src/proxy/proxy.rs
// Turns one inbound request into one (plain) or several (fault-tolerant)
// forward attempts against the host pool.
// ────────────────────────────────

use crate::load_balancer::HostSelector;
use crate::metrics::{MetricsCollector, Timer};
use crate::proxy::{ForwardError, Forwarder, OutboundRequest};
use crate::retry::{FailoverError, FailoverPolicy};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMode {
    /// One host, chosen by unconditional round-robin. Failures are surfaced.
    Plain,
    /// Healthy hosts only, retrying across the pool and marking failures down.
    FaultTolerant,
}

impl RoutingMode {
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "/route" => Some(Self::Plain),
            "/advanced_routing" => Some(Self::FaultTolerant),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Plain => "/route",
            Self::FaultTolerant => "/advanced_routing",
        }
    }
}

pub struct Proxy {
    selector: Arc<dyn HostSelector>,
    forwarder: Arc<dyn Forwarder>,
    failover: FailoverPolicy,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(
        selector: Arc<dyn HostSelector>,
        forwarder: Arc<dyn Forwarder>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let failover = FailoverPolicy::for_pool(selector.as_ref());

        Self {
            selector,
            forwarder,
            failover,
            metrics,
        }
    }

    /// Entry point for the HTTP server: picks the routing mode from the path,
    /// buffers the body and dispatches.
    pub async fn handle(&self, req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path()
        );

        async move {
            let mode = RoutingMode::from_path(req.uri().path()).ok_or(ProxyError::NotFound)?;
            if req.method() != Method::POST {
                return Err(ProxyError::MethodNotAllowed);
            }

            let (parts, body) = req.into_parts();
            let body = hyper::body::to_bytes(body)
                .await
                .map_err(ProxyError::BodyRead)?;

            self.dispatch(mode, OutboundRequest::new(parts.headers, body))
                .await
        }
        .instrument(span)
        .await
    }

    pub async fn dispatch(
        &self,
        mode: RoutingMode,
        request: OutboundRequest,
    ) -> Result<Response<Body>, ProxyError> {
        let timer = Timer::new();

        let result = match mode {
            RoutingMode::Plain => self.dispatch_plain(&request).await,
            RoutingMode::FaultTolerant => self.dispatch_fault_tolerant(&request).await,
        };

        if let Some(metrics) = &self.metrics {
            let status = match &result {
                Ok(response) => response.status(),
                Err(e) => e.status(),
            };
            metrics.record_request(mode.path(), status.as_u16(), timer.elapsed());
        }

        result
    }

    async fn dispatch_plain(&self, request: &OutboundRequest) -> Result<Response<Body>, ProxyError> {
        let target = self.selector.select_next().await;

        self.attempt(&target, request).await.map_err(|source| {
            warn!(host = %target, error = %source, "Failed to forward request");
            ProxyError::Forward {
                host: target.to_string(),
                source,
            }
        })
    }

    async fn dispatch_fault_tolerant(
        &self,
        request: &OutboundRequest,
    ) -> Result<Response<Body>, ProxyError> {
        let marked_down = AtomicBool::new(false);

        let result = self
            .failover
            .execute(self.selector.as_ref(), |target| {
                let marked_down = &marked_down;
                async move {
                    let result = self.attempt(&target, request).await;
                    if result.is_err() {
                        marked_down.store(true, Ordering::Relaxed);
                        if let Some(metrics) = &self.metrics {
                            metrics.record_host_marked_down(target.as_str());
                        }
                    }
                    result
                }
            })
            .await
            .map_err(ProxyError::from);

        // Keep the pool-wide gauge in step with the per-host ones.
        if let Some(metrics) = &self.metrics {
            if marked_down.load(Ordering::Relaxed) {
                metrics.update_backend_counts(
                    self.selector.healthy_count().await,
                    self.selector.pool_size(),
                );
            }
        }

        result
    }

    async fn attempt(
        &self,
        target: &Url,
        request: &OutboundRequest,
    ) -> Result<Response<Body>, ForwardError> {
        let timer = Timer::new();
        let result = self.forwarder.forward(target, request).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_backend_request(target.as_str(), result.is_ok(), timer.elapsed());
        }

        result
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to forward request to {host}: {source}")]
    Forward {
        host: String,
        #[source]
        source: ForwardError,
    },

    #[error("No healthy hosts available")]
    NoHealthyHost,

    #[error("All {attempts} forward attempts failed")]
    AllHostsExhausted { attempts: usize },

    #[error("Only POST method is allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    #[error("Failed to read request body: {0}")]
    BodyRead(#[source] hyper::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Forward { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::NoHealthyHost | ProxyError::AllHostsExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::BodyRead(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<FailoverError> for ProxyError {
    fn from(err: FailoverError) -> Self {
        match err {
            FailoverError::NoHealthyHost => ProxyError::NoHealthyHost,
            FailoverError::Exhausted { attempts } => ProxyError::AllHostsExhausted { attempts },
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match &err {
            ProxyError::Forward { .. } => "Failed to forward request",
            ProxyError::NoHealthyHost => "No healthy hosts available",
            ProxyError::AllHostsExhausted { .. } => "Failed to forward request after retries",
            ProxyError::MethodNotAllowed => "Only POST method is allowed",
            ProxyError::NotFound => "Not found",
            ProxyError::BodyRead(_) => "Failed to read request body",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::Rotator;
    use async_trait::async_trait;
    use hyper::body::Bytes;
    use hyper::header::HeaderValue;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Answers with the target address as the body; fails for listed hosts.
    #[derive(Default)]
    struct ScriptedForwarder {
        failing: HashSet<String>,
        seen: Mutex<Vec<(String, OutboundRequest)>>,
    }

    impl ScriptedForwarder {
        fn failing(hosts: &[&Url]) -> Self {
            Self {
                failing: hosts.iter().map(|h| h.to_string()).collect(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn targets(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward(
            &self,
            target: &Url,
            request: &OutboundRequest,
        ) -> Result<Response<Body>, ForwardError> {
            self.seen
                .lock()
                .unwrap()
                .push((target.to_string(), request.clone()));
            if self.failing.contains(target.as_str()) {
                return Err(ForwardError::Timeout(std::time::Duration::from_secs(2)));
            }
            Ok(Response::new(Body::from(target.to_string())))
        }
    }

    /// Wraps a real rotator and records every health report.
    struct RecordingSelector {
        inner: Rotator,
        marks: Mutex<Vec<(String, bool)>>,
    }

    #[async_trait]
    impl HostSelector for RecordingSelector {
        fn pool_size(&self) -> usize {
            self.inner.len()
        }

        async fn select_next(&self) -> Url {
            self.inner.select_next().await
        }

        async fn select_next_healthy(&self) -> Option<Url> {
            self.inner.select_next_healthy().await
        }

        async fn mark_health(&self, address: &Url, healthy: bool) {
            self.marks
                .lock()
                .unwrap()
                .push((address.to_string(), healthy));
            self.inner.mark_health(address, healthy).await
        }

        async fn healthy_count(&self) -> usize {
            self.inner.healthy_count().await
        }
    }

    fn hosts() -> Vec<Url> {
        ["http://localhost:8081", "http://localhost:8082", "http://localhost:8083"]
            .iter()
            .map(|s| Url::parse(s).unwrap())
            .collect()
    }

    fn recording(hosts: &[Url]) -> Arc<RecordingSelector> {
        Arc::new(RecordingSelector {
            inner: Rotator::new(hosts.to_vec()).unwrap(),
            marks: Mutex::new(Vec::new()),
        })
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post(path: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-gamer-id", "GYUTDTE")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_mode_round_robins() {
        let hosts = hosts();
        let selector = recording(&hosts);
        let forwarder = Arc::new(ScriptedForwarder::default());
        let proxy = Proxy::new(selector, forwarder, None);

        let mut bodies = Vec::new();
        for _ in 0..4 {
            let response = proxy.handle(post("/route", "{}")).await.unwrap();
            bodies.push(body_string(response).await);
        }

        let expected: Vec<String> = [0, 1, 2, 0].iter().map(|&i| hosts[i].to_string()).collect();
        assert_eq!(bodies, expected);
    }

    #[tokio::test]
    async fn test_plain_mode_surfaces_forward_error_without_retry() {
        let hosts = hosts();
        let selector = recording(&hosts);
        let forwarder = Arc::new(ScriptedForwarder::failing(&[&hosts[0]]));
        let proxy = Proxy::new(selector.clone(), forwarder.clone(), None);

        let err = proxy.handle(post("/route", "{}")).await.unwrap_err();

        assert!(matches!(err, ProxyError::Forward { ref host, .. } if host == hosts[0].as_str()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(forwarder.targets().len(), 1);
        assert!(selector.marks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fault_tolerant_marks_failed_host_once_and_returns_next() {
        let hosts = hosts();
        let selector = recording(&hosts);
        let forwarder = Arc::new(ScriptedForwarder::failing(&[&hosts[0]]));
        let proxy = Proxy::new(selector.clone(), forwarder.clone(), None);

        let response = proxy.handle(post("/advanced_routing", "{}")).await.unwrap();

        assert_eq!(body_string(response).await, hosts[1].to_string());
        assert_eq!(
            *selector.marks.lock().unwrap(),
            vec![(hosts[0].to_string(), false)]
        );
        assert_eq!(
            forwarder.targets(),
            vec![hosts[0].to_string(), hosts[1].to_string()]
        );
    }

    #[tokio::test]
    async fn test_fault_tolerant_replays_body_and_headers() {
        let hosts = hosts();
        let selector = recording(&hosts);
        let forwarder = Arc::new(ScriptedForwarder::failing(&[&hosts[0]]));
        let proxy = Proxy::new(selector, forwarder.clone(), None);

        proxy
            .handle(post("/advanced_routing", r#"{"points":42}"#))
            .await
            .unwrap();

        let seen = forwarder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        for (_, request) in seen.iter() {
            assert_eq!(request.body, Bytes::from_static(br#"{"points":42}"#));
            assert_eq!(
                request.headers.get("x-gamer-id"),
                Some(&HeaderValue::from_static("GYUTDTE"))
            );
        }
    }

    #[tokio::test]
    async fn test_fault_tolerant_no_healthy_host() {
        let hosts = hosts();
        let selector = recording(&hosts);
        for host in &hosts {
            selector.inner.mark_health(host, false).await;
        }
        let forwarder = Arc::new(ScriptedForwarder::default());
        let proxy = Proxy::new(selector, forwarder.clone(), None);

        let err = proxy.handle(post("/advanced_routing", "{}")).await.unwrap_err();

        assert!(matches!(err, ProxyError::NoHealthyHost));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(forwarder.targets().is_empty());
    }

    #[tokio::test]
    async fn test_fault_tolerant_all_hosts_exhausted() {
        let hosts = hosts();
        let selector = recording(&hosts);
        let forwarder = Arc::new(ScriptedForwarder::failing(&[&hosts[0], &hosts[1], &hosts[2]]));
        let proxy = Proxy::new(selector.clone(), forwarder.clone(), None);

        let err = proxy.handle(post("/advanced_routing", "{}")).await.unwrap_err();

        assert!(matches!(err, ProxyError::AllHostsExhausted { attempts: 3 }));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(forwarder.targets().len(), 3);
        assert_eq!(selector.marks.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_success_does_not_heal_host() {
        let hosts = hosts();
        let selector = recording(&hosts);
        selector.inner.mark_health(&hosts[0], false).await;
        let forwarder = Arc::new(ScriptedForwarder::default());
        let proxy = Proxy::new(selector.clone(), forwarder, None);

        proxy.handle(post("/advanced_routing", "{}")).await.unwrap();
        proxy.handle(post("/advanced_routing", "{}")).await.unwrap();

        assert!(!selector.inner.snapshot().await[0].healthy);
    }

    #[tokio::test]
    async fn test_rejects_non_post_and_unknown_paths() {
        let proxy = Proxy::new(
            recording(&hosts()),
            Arc::new(ScriptedForwarder::default()),
            None,
        );

        let get = Request::builder()
            .method(Method::GET)
            .uri("/route")
            .body(Body::empty())
            .unwrap();
        let err = proxy.handle(get).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);

        let err = proxy.handle(post("/elsewhere", "{}")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mark_down_refreshes_healthy_count_gauge() {
        let hosts = hosts();
        let registry = crate::metrics::MetricsRegistry::new().unwrap();
        let metrics = registry.collector();
        metrics.update_backend_counts(3, 3);
        let forwarder = Arc::new(ScriptedForwarder::failing(&[&hosts[0]]));
        let proxy = Proxy::new(recording(&hosts), forwarder, Some(metrics.clone()));

        proxy.handle(post("/advanced_routing", "{}")).await.unwrap();

        assert_eq!(metrics.healthy_backends.get(), 2);
        assert_eq!(metrics.total_backends.get(), 3);
        assert_eq!(
            metrics
                .backend_health_status
                .with_label_values(&[hosts[0].as_str()])
                .get(),
            0
        );
    }

    #[tokio::test]
    async fn test_error_converts_to_response() {
        let response: Response<Body> = ProxyError::NoHealthyHost.into();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_string(response).await, "No healthy hosts available");
    }
}
