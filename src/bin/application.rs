//! src/bin/application.rs
//! Backend instance the router forwards to.
//! Run: cargo run --bin application -- <port>

use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use rand::Rng;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    port:          u16,
    req_counter:   Arc<AtomicU64>,
    base_delay:    u64,
    unhealthy_pct: f64,
}

fn json(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn handle(req: Request<Body>, state: AppState) -> Result<Response<Body>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => {
            let unhealthy = state.unhealthy_pct > 0.0
                && rand::thread_rng().gen_bool((state.unhealthy_pct / 100.0).min(1.0));

            if unhealthy {
                Ok(json(
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({ "status": "unhealthy" }),
                ))
            } else {
                Ok(json(StatusCode::OK, serde_json::json!({ "status": "healthy" })))
            }
        }
        (&Method::POST, "/echo") => {
            let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let content_type = req.headers().get(CONTENT_TYPE).cloned();

            let body = match hyper::body::to_bytes(req.into_body()).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to read request body: {}", e);
                    return Ok(json(
                        StatusCode::BAD_REQUEST,
                        serde_json::json!({ "status": "error", "message": "Failed to read request body" }),
                    ));
                }
            };

            if state.base_delay > 0 {
                sleep(Duration::from_millis(state.base_delay)).await;
            }

            info!(
                port = state.port,
                req = n,
                payload = %String::from_utf8_lossy(&body),
                "Echoing payload"
            );

            let mut response = Response::new(Body::from(body));
            if let Some(content_type) = content_type {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            Ok(response)
        }
        (_, "/health") | (_, "/echo") => {
            let mut response = Response::new(Body::from("Method not allowed"));
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            Ok(response)
        }
        _ => {
            let mut response = Response::new(Body::from("Not Found"));
            *response.status_mut() = StatusCode::NOT_FOUND;
            Ok(response)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("application=info".parse()?),
        )
        .init();

    // ── Parse args / env ─────────────────────────────────────────────
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8081".into())
        .parse()?;

    let base_delay =
        std::env::var("BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    let unhealthy_pct =
        std::env::var("UNHEALTHY_PCT").ok().and_then(|v| v.parse().ok()).unwrap_or(0.0);

    let state = AppState {
        port,
        req_counter: Arc::new(AtomicU64::new(0)),
        base_delay,
        unhealthy_pct,
    };

    // ── Hyper server ────────────────────────────────────────────────
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                handle(req, st.clone())
            }))
        }
    });

    info!(
        "Application API running on http://{}  [delay={}ms unhealthy={}%]",
        addr, base_delay, unhealthy_pct
    );

    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
