//! Per-request tracing for the repair desk API.
//!
//! The layer resolves a correlation id for every call (the inbound
//! `X-Correlation-ID` when it is a valid UUID, a fresh v4 otherwise), stores
//! it in the request extensions for [`CorrelationId`](crate::CorrelationId),
//! runs the handler inside an `http_request` span, and echoes the id on the
//! response. Each completed call is logged with its status and latency and
//! counted in `repair_desk.http.responses`.

use crate::extractors::ACTOR_ROLE_HEADER;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation id carried by `headers`, if it is a valid UUID.
pub(crate) fn correlation_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Layer installing [`RequestTracing`] around every route.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = RequestTracing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTracing { inner }
    }
}

/// Service wrapper produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct RequestTracing<S> {
    inner: S,
}

impl<S> Service<Request> for RequestTracing<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = correlation_id_from(req.headers()).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(correlation_id);

        let method = req.method().clone();
        let actor_role = req
            .headers()
            .get(ACTOR_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("anonymous")
            .to_owned();
        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %method,
            path = %req.uri().path(),
            actor_role = %actor_role,
        );

        let started = Instant::now();
        let fut = self.inner.call(req).instrument(span.clone());

        Box::pin(async move {
            let mut response = fut.await?;
            let status = response.status();

            span.in_scope(|| {
                tracing::debug!(
                    status = status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Request finished"
                );
            });
            metrics::counter!(
                "repair_desk.http.responses",
                "method" => method.to_string(),
                "status" => status.as_u16().to_string()
            )
            .increment(1);

            if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::extractors::CorrelationId;
    use axum::{Router, body::Body, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        async fn echo(CorrelationId(id): CorrelationId) -> String {
            id.to_string()
        }

        Router::new()
            .route("/echo", get(echo))
            .layer(correlation_id_layer())
    }

    async fn call(header: Option<&str>) -> (String, String) {
        let mut builder = Request::builder().uri("/echo");
        if let Some(value) = header {
            builder = builder.header(CORRELATION_ID_HEADER, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let echoed = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        (echoed, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn generates_id_when_absent() {
        let (echoed, seen_by_handler) = call(None).await;

        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(echoed, seen_by_handler);
    }

    #[tokio::test]
    async fn keeps_inbound_id() {
        let inbound = Uuid::new_v4().to_string();

        let (echoed, seen_by_handler) = call(Some(&inbound)).await;

        assert_eq!(echoed, inbound);
        assert_eq!(seen_by_handler, inbound);
    }

    #[tokio::test]
    async fn replaces_malformed_id() {
        let (echoed, _) = call(Some("not-a-uuid")).await;

        assert_ne!(echoed, "not-a-uuid");
        assert!(Uuid::parse_str(&echoed).is_ok());
    }

    #[test]
    fn parses_header_with_whitespace() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            CORRELATION_ID_HEADER,
            HeaderValue::from_str(&format!(" {id} ")).unwrap(),
        );

        assert_eq!(correlation_id_from(&headers), Some(id));
    }
}
