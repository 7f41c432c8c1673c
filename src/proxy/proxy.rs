// ────────────────────────────────
// src/proxy/proxy.rs
// Proxy component that handles HTTP request forwarding
// ────────────────────────────────

use crate::config::Config;
use crate::health::HealthChecker;
use crate::load_balancer::{LoadBalancer, RoundRobinBalancer};
use crate::metrics::{MetricsCollector, Timer};
use crate::proxy::{Backend, BackendPool};
use anyhow::Result;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, Response, StatusCode, Version};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct Proxy {
    config: Config,
    pool: Arc<BackendPool>,
    balancer: Arc<dyn LoadBalancer>,
    client: Client<HttpConnector>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Proxy {
    pub fn new(
        config: Config,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let balancer: Arc<dyn LoadBalancer> = Arc::new(RoundRobinBalancer::new());
        info!(
            "Proxy using {} balancing over {} backends",
            balancer.name(),
            pool.len()
        );

        Self {
            config,
            pool,
            balancer,
            client: Client::new(),
            metrics,
        }
    }

    pub fn balancer_name(&self) -> &'static str {
        self.balancer.name()
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Spawn the background health checker for this proxy's pool.
    pub fn start_health_checker(&self) -> Result<Arc<HealthChecker>> {
        let checker = Arc::new(HealthChecker::new(
            self.config.health_check.clone(),
            self.pool.clone(),
            self.metrics.clone(),
        )?);

        tokio::spawn(checker.clone().start());
        Ok(checker)
    }

    pub async fn select_next(&self) -> Option<Arc<Backend>> {
        self.balancer.select_backend(self.pool.backends()).await
    }

    /// Forward `req` to the next alive backend and relay its response as is.
    pub async fn handle(&self, mut req: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let backend = match self.select_next().await {
            Some(backend) => backend,
            None => {
                warn!("No alive backend for {} {}", req.method(), req.uri());
                if let Some(metrics) = &self.metrics {
                    metrics.record_no_backend();
                }
                return Err(ProxyError::NoHealthyBackends);
            }
        };

        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = backend
            .target_uri(path_and_query)
            .map_err(|e| ProxyError::BackendError(e.to_string()))?;

        debug!(backend = %backend.id, %target, "forwarding request");

        let method = req.method().clone();
        *req.uri_mut() = target;
        // Upstream connections are plain HTTP/1.1 whatever the client spoke.
        *req.version_mut() = Version::HTTP_11;

        let timer = Timer::new();
        let result = timeout(
            self.config.proxy.request_timeout(),
            self.client.request(req),
        )
        .await;
        let outcome = match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ProxyError::BackendError(e.to_string())),
            Err(_) => Err(ProxyError::Timeout),
        };

        let status = match &outcome {
            Ok(response) => response.status(),
            Err(e) => e.status_code(),
        };
        backend.record_request(outcome.is_ok());
        if let Some(metrics) = &self.metrics {
            metrics.record_request(method.as_str(), status.as_u16(), &backend.id, timer.elapsed());
        }

        if let Err(e) = &outcome {
            warn!(backend = %backend.id, error = %e, "forwarding failed");
        }

        outcome
    }
}

// Custom error type for proxy operations
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Backend error: {0}")]
    BackendError(String),

    #[error("Request timeout")]
    Timeout,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NoHealthyBackends => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

// Convert ProxyError to Hyper Response for error handling
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let message = match err {
            ProxyError::NoHealthyBackends => "No healthy backends available",
            ProxyError::BackendError(_) => "Internal server error",
            ProxyError::Timeout => "Gateway timeout",
        };

        let mut response = Response::new(Body::from(message));
        *response.status_mut() = err.status_code();
        response
    }
}
