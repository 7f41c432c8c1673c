//
// src/proxy/mod.rs
//
mod backend;
mod pool;
#[allow(clippy::module_inception)]
mod proxy;

pub use backend::{Backend, BackendStatus, HealthStatus};
pub use pool::BackendPool;
pub use proxy::{Proxy, ProxyError};
