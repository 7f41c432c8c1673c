// src/proxy/backend.rs
use crate::config::backend_id;
use chrono::{DateTime, Utc};
use hyper::Uri;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Alive,
    Down,
}

impl From<bool> for HealthStatus {
    fn from(alive: bool) -> Self {
        if alive {
            HealthStatus::Alive
        } else {
            HealthStatus::Down
        }
    }
}

/// One upstream server. The URL never changes; liveness is written by the
/// health checker and read by the selector.
#[derive(Debug)]
pub struct Backend {
    pub id: String,
    pub url: Url,

    // Runtime state
    alive: RwLock<bool>,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
}

impl Backend {
    /// Backends start alive so traffic flows before the first probe completes.
    pub fn new(url: Url) -> Self {
        Self {
            id: backend_id(&url),
            url,
            alive: RwLock::new(true),
            last_health_check: RwLock::new(None),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
        }
    }

    pub async fn is_alive(&self) -> bool {
        *self.alive.read().await
    }

    /// Overwrite the liveness flag and return the previous value.
    pub async fn set_alive(&self, alive: bool) -> bool {
        let previous = {
            let mut flag = self.alive.write().await;
            std::mem::replace(&mut *flag, alive)
        };

        *self.last_health_check.write().await = Some(Utc::now());
        previous
    }

    pub async fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.read().await
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Resolve a request's path and query against this backend's base URL.
    pub fn target_uri(&self, path_and_query: &str) -> Result<Uri, hyper::http::uri::InvalidUri> {
        let base = self.url.as_str().trim_end_matches('/');
        let path_and_query = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{}", path_and_query)
        };
        format!("{}{}", base, path_and_query).parse()
    }

    pub async fn status(&self) -> BackendStatus {
        BackendStatus {
            id: self.id.clone(),
            url: self.url.to_string(),
            status: self.is_alive().await.into(),
            last_health_check: self.last_health_check().await,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub id: String,
    pub url: String,
    pub status: HealthStatus,
    pub last_health_check: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub failed_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(url: &str) -> Backend {
        Backend::new(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn starts_alive_without_probe_timestamp() {
        let b = backend("http://localhost:8081");
        assert!(b.is_alive().await);
        assert!(b.last_health_check().await.is_none());
        assert_eq!(b.id, "localhost:8081");
    }

    #[tokio::test]
    async fn repeated_writes_are_idempotent() {
        let b = backend("http://localhost:8081");

        assert!(b.set_alive(false).await);
        assert!(!b.set_alive(false).await);
        assert!(!b.is_alive().await);

        assert!(!b.set_alive(true).await);
        assert!(b.set_alive(true).await);
        assert!(b.is_alive().await);
        assert!(b.last_health_check().await.is_some());
    }

    #[test]
    fn default_port_is_used_for_id() {
        assert_eq!(backend("http://example.com").id, "example.com:80");
        assert_eq!(backend("https://example.com").id, "example.com:443");
    }

    #[test]
    fn target_uri_keeps_path_and_query() {
        let b = backend("http://localhost:8081");
        let uri = b.target_uri("/users/7?expand=true").unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8081/users/7?expand=true");
    }

    #[test]
    fn target_uri_respects_base_path() {
        let b = backend("http://localhost:8081/api/");
        let uri = b.target_uri("/users").unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8081/api/users");
    }

    #[tokio::test]
    async fn status_reports_counters() {
        let b = backend("http://localhost:8081");
        b.record_request(true);
        b.record_request(false);
        b.set_alive(false).await;

        let status = b.status().await;
        assert_eq!(status.status, HealthStatus::Down);
        assert_eq!(status.total_requests, 2);
        assert_eq!(status.failed_requests, 1);
    }
}
