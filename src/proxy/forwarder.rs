// src/proxy/forwarder.rs
use crate::load_balancer::endpoint;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::HOST;
use hyper::{Body, Client, HeaderMap, Method, Request, Response};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Failed to build forward request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("Forward timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend error: {0}")]
    Transport(#[from] hyper::Error),
}

/// The inbound request reduced to what gets replayed to a backend.
/// The body is buffered so retries can send it again.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    /// `Host` is dropped so the client sets it for the target.
    pub fn new(mut headers: HeaderMap, body: Bytes) -> Self {
        headers.remove(HOST);
        Self { headers, body }
    }
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        target: &Url,
        request: &OutboundRequest,
    ) -> Result<Response<Body>, ForwardError>;
}

/// `POST <host><path>` with the inbound headers and body. The timeout covers
/// the whole exchange including reading the response body, so a backend that
/// stalls mid-body counts as a failed forward.
pub struct HttpForwarder {
    client: Client<HttpsConnector<HttpConnector>>,
    path: String,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().build(HttpsConnector::new());

        Self {
            client,
            path: path.into(),
            timeout,
        }
    }

    async fn exchange(&self, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let response = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        let body = hyper::body::to_bytes(body).await?;
        Ok(Response::from_parts(parts, Body::from(body)))
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        target: &Url,
        request: &OutboundRequest,
    ) -> Result<Response<Body>, ForwardError> {
        let url = endpoint(target, &self.path);

        let mut builder = Request::builder().method(Method::POST).uri(url.as_str());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
        }
        let outbound = builder.body(Body::from(request.body.clone()))?;

        timeout(self.timeout, self.exchange(outbound))
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderValue, CONTENT_TYPE};

    #[test]
    fn test_outbound_request_drops_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("router.local"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = OutboundRequest::new(headers, Bytes::from_static(b"{}"));

        assert!(request.headers.get(HOST).is_none());
        assert_eq!(request.headers[CONTENT_TYPE], "application/json");
        assert_eq!(request.body, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_unreachable_target_is_a_forward_error() {
        let forwarder = HttpForwarder::new("/echo", Duration::from_secs(2));
        let target = Url::parse("http://127.0.0.1:1").unwrap();

        let result = forwarder.forward(&target, &OutboundRequest::default()).await;

        assert!(matches!(result, Err(ForwardError::Transport(_))));
    }
}
