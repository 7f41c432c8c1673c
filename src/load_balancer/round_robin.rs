// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Round robin over a fixed pool, skipping backends marked down.
///
/// Every attempt, including ones that land on a down backend, consumes one
/// cursor slot, so concurrent callers never share a slot and a full miss
/// costs exactly `backends.len()` slots.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next cursor slot.
    fn next_slot(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

#[async_trait]
impl LoadBalancer for RoundRobinBalancer {
    async fn select_backend(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let len = backends.len();

        for _ in 0..len {
            let backend = &backends[self.next_slot(len)];
            if backend.is_alive().await {
                return Some(backend.clone());
            }
        }

        None
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
