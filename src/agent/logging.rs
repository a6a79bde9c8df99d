//! Request Logging
//!
//! Hooks for `tower_http::trace::TraceLayer`: one span per request carrying
//! method and path, and one line per response with status and latency.

use axum::{body::Body, extract::Request, response::Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Span};

/// Span opened for every request
pub fn make_request_span(req: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
    )
}

/// Emitted once the wrapped handler has produced a response
pub fn log_response(response: &Response, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        elapsed_ms = latency.as_millis() as u64,
        "request completed"
    );
}

/// Logging wrapper applied to every route
pub fn request_logging_layer() -> TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    fn(&Request<Body>) -> Span,
    tower_http::trace::DefaultOnRequest,
    fn(&Response, Duration, &Span),
> {
    TraceLayer::new_for_http()
        .make_span_with(make_request_span as fn(&Request<Body>) -> Span)
        .on_response(log_response as fn(&Response, Duration, &Span))
}
