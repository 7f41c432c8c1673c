//
// src/proxy/pool.rs
//

use super::backend::{Backend, BackendStatus};
use crate::config::BackendConfig;
use std::sync::Arc;

/// Fixed, ordered set of backends. The order is the round-robin order and
/// never changes; only each backend's liveness flag is mutable.
#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Arc<[Arc<Backend>]>,
}

impl BackendPool {
    pub fn new(configs: Vec<BackendConfig>) -> Self {
        let backends: Vec<Arc<Backend>> = configs
            .into_iter()
            .map(|config| Arc::new(Backend::new(config.url)))
            .collect();

        tracing::info!("Backend pool created with {} backends", backends.len());

        Self {
            backends: backends.into(),
        }
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get_backend(&self, id: &str) -> Option<Arc<Backend>> {
        self.backends.iter().find(|b| b.id == id).cloned()
    }

    pub async fn get_liveness(&self, backend: &Backend) -> bool {
        backend.is_alive().await
    }

    pub async fn set_liveness(&self, backend: &Backend, alive: bool) {
        backend.set_alive(alive).await;
    }

    pub async fn alive_count(&self) -> usize {
        let mut count = 0;
        for backend in self.backends.iter() {
            if backend.is_alive().await {
                count += 1;
            }
        }
        count
    }

    pub async fn snapshot(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(self.backends.len());
        for backend in self.backends.iter() {
            statuses.push(backend.status().await);
        }
        statuses
    }
}
