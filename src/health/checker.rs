// src/health/checker.rs
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{Backend, BackendPool};
use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    client: Client,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend_id: String,
    pub alive: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create health check HTTP client")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            config,
            pool,
            client,
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Probe the whole pool once per interval until `shutdown` is called.
    pub async fn start(self: Arc<Self>) {
        let mut interval = interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            "Starting health checker with interval: {:?}, timeout: {:?}",
            self.config.interval(),
            self.config.timeout()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run one tick: probe every backend concurrently and record each outcome.
    pub async fn check_all_backends(self: &Arc<Self>) -> Vec<HealthCheckResult> {
        let tasks: Vec<_> = self
            .pool
            .backends()
            .iter()
            .cloned()
            .map(|backend| {
                let checker = self.clone();
                tokio::spawn(async move { checker.check_backend(backend).await })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (joined, backend) in futures::future::join_all(tasks)
            .await
            .into_iter()
            .zip(self.pool.backends())
        {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    // The probe task died before writing; record the backend as down.
                    error!("Health check task for {} failed: {}", backend.id, e);
                    self.record(backend, false).await;
                    results.push(HealthCheckResult {
                        backend_id: backend.id.clone(),
                        alive: false,
                        response_time_ms: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let alive_count = results.iter().filter(|r| r.alive).count();
        let total = self.pool.len();

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(alive_count, total);
        }

        info!(
            "Health check complete: {} alive, {} down",
            alive_count,
            total - alive_count
        );

        results
    }

    async fn check_backend(&self, backend: Arc<Backend>) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let (alive, error) = self.probe(&backend).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        self.record(&backend, alive).await;

        match &error {
            None => debug!("Backend {} is alive ({} ms)", backend.id, response_time_ms),
            Some(e) => debug!("Backend {} probe failed: {}", backend.id, e),
        }

        HealthCheckResult {
            backend_id: backend.id.clone(),
            alive,
            response_time_ms,
            error,
        }
    }

    /// Alive on any status below 400; down on transport errors, timeouts and
    /// error-class statuses.
    async fn probe(&self, backend: &Backend) -> (bool, Option<String>) {
        // Same prefix handling as forwarded requests.
        let url = match backend.target_uri(&self.config.path) {
            Ok(uri) => uri.to_string(),
            Err(e) => return (false, Some(format!("invalid probe URL: {}", e))),
        };

        let result = timeout(self.config.timeout(), self.client.get(url).send()).await;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    (false, Some(format!("HTTP {}", status)))
                } else {
                    (true, None)
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Request timeout".to_string())),
        }
    }

    /// Write the outcome unconditionally and log state transitions.
    async fn record(&self, backend: &Backend, alive: bool) {
        let was_alive = backend.set_alive(alive).await;

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.id, alive);
        }

        match (was_alive, alive) {
            (true, false) => warn!("Backend {} is now DOWN", backend.id),
            (false, true) => info!("Backend {} is ALIVE again", backend.id),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use url::Url;

    fn checker_for(urls: &[String], path: &str) -> Arc<HealthChecker> {
        let pool = Arc::new(BackendPool::new(
            urls.iter()
                .map(|u| BackendConfig {
                    url: Url::parse(u).unwrap(),
                })
                .collect(),
        ));
        let config = HealthCheckConfig {
            interval_secs: 1,
            timeout_secs: 1,
            path: path.to_string(),
        };
        Arc::new(HealthChecker::new(config, pool, None).unwrap())
    }

    #[tokio::test]
    async fn probe_uses_configured_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/healthz")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let checker = checker_for(&[server.url()], "/healthz");
        let results = checker.check_all_backends().await;

        mock.assert_async().await;
        assert!(results[0].alive);
        assert!(results[0].error.is_none());
    }

    #[tokio::test]
    async fn non_error_status_counts_as_alive() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(202)
            .create_async()
            .await;

        let checker = checker_for(&[server.url()], "/");
        let results = checker.check_all_backends().await;
        assert!(results[0].alive);
    }

    #[tokio::test]
    async fn client_error_status_marks_down() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(404)
            .create_async()
            .await;

        let checker = checker_for(&[server.url()], "/");
        let results = checker.check_all_backends().await;

        assert!(!results[0].alive);
        assert_eq!(results[0].error.as_deref(), Some("HTTP 404 Not Found"));
        assert!(!checker.pool.backends()[0].is_alive().await);
    }

    #[tokio::test]
    async fn probe_keeps_base_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/healthz")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let checker = checker_for(&[format!("{}/api", server.url())], "/healthz");
        let results = checker.check_all_backends().await;

        mock.assert_async().await;
        assert!(results[0].alive);
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while !condition().await {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn running_loop_marks_down_then_alive() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/")
            .with_status(500)
            .create_async()
            .await;

        let checker = checker_for(&[server.url()], "/");
        let backend = checker.pool.backends()[0].clone();
        let handle = tokio::spawn(checker.clone().start());

        wait_until(|| {
            let backend = backend.clone();
            async move { !backend.is_alive().await }
        })
        .await;

        // Still down on the next tick, but the write happens anyway.
        let first_write = backend.last_health_check().await;
        wait_until(|| {
            let backend = backend.clone();
            async move { backend.last_health_check().await != first_write }
        })
        .await;
        assert!(!backend.is_alive().await);

        failing.remove_async().await;
        let _healthy = server
            .mock("GET", "/")
            .with_status(200)
            .create_async()
            .await;

        wait_until(|| {
            let backend = backend.clone();
            async move { backend.is_alive().await }
        })
        .await;

        checker.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("health checker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let checker = checker_for(&["http://127.0.0.1:1".to_string()], "/");
        let handle = tokio::spawn(checker.clone().start());

        checker.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("health checker did not stop")
            .unwrap();
    }
}
