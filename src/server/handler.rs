// src/server/handler.rs
use hyper::header::HeaderValue;
use hyper::{Body, Request, Response};
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use crate::proxy::Proxy;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct RequestHandler {
    proxy: Arc<Proxy>,
}

impl RequestHandler {
    pub fn new(proxy: Arc<Proxy>) -> Self {
        Self { proxy }
    }
}

impl Service<Request<Body>> for RequestHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let proxy = self.proxy.clone();

        let existing = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .map(|value| value.to_str().unwrap_or("invalid").to_string());
        let request_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.headers_mut().insert(REQUEST_ID_HEADER, value);
                }
                id
            }
        };
        let span = tracing::info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path()
        );

        Box::pin(
            async move {
                match proxy.handle(req).await {
                    Ok(response) => Ok(response),
                    Err(e) => {
                        tracing::error!(%e, "proxy error");
                        Ok(e.into())
                    }
                }
            }
            .instrument(span),
        )
    }
}
