// src/server/admin.rs
use crate::config::AdminConfig;
use crate::metrics::MetricsRegistry;
use crate::proxy::BackendPool;
use anyhow::{Context, Result};
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state behind the admin listener.
pub struct AdminState {
    pub config: AdminConfig,
    pub registry: MetricsRegistry,
    pub pool: Arc<BackendPool>,
}

pub async fn handle_admin(req: Request<Body>, state: Arc<AdminState>) -> Response<Body> {
    if req.method() != Method::GET {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    let path = req.uri().path();
    if path == state.config.metrics_path {
        match state.registry.gather() {
            Ok(metrics) => with_content_type(metrics, "text/plain; version=0.0.4"),
            Err(e) => {
                error!("Failed to encode metrics: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
            }
        }
    } else if path == state.config.status_path {
        let snapshot = state.pool.snapshot().await;
        match serde_json::to_vec(&snapshot) {
            Ok(body) => with_content_type(body, "application/json"),
            Err(e) => {
                error!("Failed to encode status: {}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode status")
            }
        }
    } else {
        plain(StatusCode::NOT_FOUND, "Not Found")
    }
}

/// Spawn the metrics/status server on its own port.
pub fn spawn_admin_server(addr: SocketAddr, state: Arc<AdminState>) -> Result<()> {
    let make_service = hyper::service::make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_admin(req, state).await) }
            }))
        }
    });

    let server = hyper::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind admin listener {}", addr))?
        .serve(make_service);
    info!("Admin server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Admin server error: {}", e);
        }
    });

    Ok(())
}

fn plain(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

fn with_content_type(body: Vec<u8>, content_type: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, hyper::header::HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use url::Url;

    fn state() -> Arc<AdminState> {
        let pool = Arc::new(BackendPool::new(vec![
            BackendConfig {
                url: Url::parse("http://localhost:8081").unwrap(),
            },
            BackendConfig {
                url: Url::parse("http://localhost:8082").unwrap(),
            },
        ]));
        Arc::new(AdminState {
            config: AdminConfig::default(),
            registry: MetricsRegistry::new().unwrap(),
            pool,
        })
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn status_lists_backend_liveness() {
        let state = state();
        state.pool.backends()[1].set_alive(false).await;

        let response = handle_admin(get("/status"), state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json[0]["id"], "localhost:8081");
        assert_eq!(json[0]["status"], "alive");
        assert_eq!(json[1]["status"], "down");
        assert!(json[0]["last_health_check"].is_null());
        assert!(json[1]["last_health_check"].is_string());
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let state = state();
        state.registry.collector().update_backend_counts(1, 2);

        let response = handle_admin(get("/metrics"), state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("lb_total_backends 2"));
    }

    #[tokio::test]
    async fn unknown_path_and_method() {
        let response = handle_admin(get("/nope"), state()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let post = Request::post("/status").body(Body::empty()).unwrap();
        let response = handle_admin(post, state()).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
