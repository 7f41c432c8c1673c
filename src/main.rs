// src/main.rs
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use rr_balancer::{
    config::{self, Config, DEFAULT_BACKENDS},
    metrics::MetricsRegistry,
    proxy::{BackendPool, Proxy},
    server::{spawn_admin_server, AdminState, RequestHandler, ServerBuilder},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rr_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration; any error here aborts startup.
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            config::load_config(&path).await?
        }
        None => {
            info!("No configuration file given, using built-in backends");
            Config::from_urls(DEFAULT_BACKENDS)?
        }
    };

    // Initialize metrics
    let metrics_registry = MetricsRegistry::new()?;
    let metrics = metrics_registry.collector();

    // Create backend pool
    let pool = Arc::new(BackendPool::new(config.backends.clone()));
    metrics.update_backend_counts(pool.len(), pool.len());

    // Create proxy
    let proxy = Arc::new(Proxy::new(config.clone(), pool.clone(), Some(metrics)));

    // Start health checker
    let health_checker = proxy.start_health_checker()?;

    // Start admin server if enabled
    if config.admin.enabled {
        let admin_addr: SocketAddr = ([0, 0, 0, 0], config.admin.port).into();
        let state = Arc::new(AdminState {
            config: config.admin.clone(),
            registry: metrics_registry,
            pool,
        });
        spawn_admin_server(admin_addr, state)?;
    }

    // Create request handler
    let handler = RequestHandler::new(proxy);

    info!("Starting load balancer on {}", config.listen_addr);
    ServerBuilder::new(config.listen_addr)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    health_checker.shutdown();
    info!("Load balancer stopped");
    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
