use core::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tower_http::{
    classify::ServerErrorsFailureClass,
    trace::{DefaultOnFailure, OnFailure},
};
use tracing::Span;

/// Failure hook for the trace layer.
///
/// `POST /remote/control` answers every core failure with a `503` after logging
/// the cause itself, so the trace layer only notes those at `INFO`. Any other
/// server error keeps the default `ERROR` report.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DowngradeUnavailable;

impl OnFailure<ServerErrorsFailureClass> for DowngradeUnavailable {
    fn on_failure(&mut self, class: ServerErrorsFailureClass, latency: Duration, span: &Span) {
        match class {
            ServerErrorsFailureClass::StatusCode(StatusCode::SERVICE_UNAVAILABLE) => {
                tracing::info!(
                    latency_ms = latency.as_millis(),
                    "Answered with 503, cause logged by the handler"
                );
            }
            other => DefaultOnFailure::default().on_failure(other, latency, span),
        }
    }
}

const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("cross-origin-opener-policy", "same-origin"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("x-content-type-options", "nosniff"),
    ("cache-control", "no-store"),
];

/// Adds the fixed response headers.
///
/// Responses are JSON or a websocket upgrade: none may load content, be framed,
/// be sniffed as another type, or be cached, since host state changes constantly.
pub(crate) async fn secure_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in RESPONSE_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    response
}
