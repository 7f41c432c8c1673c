// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LoadBalancer: Send + Sync {
    /// Pick the backend for the next request, or `None` when no backend in
    /// `backends` is currently alive.
    async fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}
