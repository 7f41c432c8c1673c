//! demos/demo_backend.rs
//! Run: cargo run --example demo_backend -- <port> [name]
//!
//! Start three of these on 8081-8083 to feed the built-in pool.

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use rand::Rng;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::sleep;

#[derive(Clone)]
struct BackendState {
    name: String,
    req_counter: Arc<AtomicU64>,
    healthy_flag: Arc<AtomicBool>,
    base_delay: u64,
    jitter_ms: u64,
    fail_pct: f64,
}

fn respond(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn handle(req: Request<Body>, state: BackendState) -> Result<Response<Body>, Infallible> {
    let n = state.req_counter.fetch_add(1, Ordering::SeqCst) + 1;
    let path = req.uri().path().to_owned();

    // Flip the answer the load balancer's probe will see
    if path == "/toggle" {
        let was = state.healthy_flag.fetch_xor(true, Ordering::SeqCst);
        let now = if was { "unhealthy" } else { "healthy" };
        println!("[{}] now {}", state.name, now);
        return Ok(respond(StatusCode::OK, format!("{} is now {}\n", state.name, now)));
    }

    if !state.healthy_flag.load(Ordering::SeqCst) {
        return Ok(respond(StatusCode::SERVICE_UNAVAILABLE, "Unhealthy"));
    }

    // Simulate latency
    let delay = state.base_delay + rand::thread_rng().gen_range(0..=state.jitter_ms);
    if delay > 0 {
        sleep(Duration::from_millis(delay)).await;
    }

    // Simulate failure
    if state.fail_pct > 0.0 && rand::thread_rng().gen_bool((state.fail_pct / 100.0).min(1.0)) {
        return Ok(respond(StatusCode::INTERNAL_SERVER_ERROR, "Injected failure"));
    }

    println!("[{}] #{} {} {}", state.name, n, req.method(), path);

    let mut response = respond(StatusCode::OK, format!("Response from {}\n", state.name));
    if let Ok(value) = state.name.parse() {
        response.headers_mut().insert("x-backend-name", value);
    }
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "8081".into())
        .parse()?;
    let name = std::env::args()
        .nth(2)
        .or_else(|| std::env::var("BACKEND_NAME").ok())
        .unwrap_or_else(|| format!("server-{port}"));

    let base_delay = std::env::var("BASE_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let jitter_ms = std::env::var("JITTER_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let fail_pct = std::env::var("FAIL_PCT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);

    let state = BackendState {
        name: name.clone(),
        req_counter: Arc::new(AtomicU64::new(0)),
        healthy_flag: Arc::new(AtomicBool::new(true)),
        base_delay,
        jitter_ms,
        fail_pct,
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let make_svc = make_service_fn(move |_conn| {
        let st = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, st.clone()))) }
    });

    println!(
        "Demo backend '{}' on http://{}  [delay={}ms±{} fail={}%]",
        name, addr, base_delay, jitter_ms, fail_pct
    );

    Server::try_bind(&addr)?.serve(make_svc).await?;
    Ok(())
}
