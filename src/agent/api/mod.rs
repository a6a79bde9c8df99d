//! Agent API Endpoints
//!
//! JSON handlers behind the auth gate, plus the shared error body.

pub mod exec;
pub mod health;
pub mod network;
pub mod speedtest;

use crate::diagnostics::{Diagnostics, IpLookupError, ToolError};
use crate::gateway::{CommandGateway, GatewayError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

pub use health::health_router;

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// State shared by the gated handlers
#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<CommandGateway>,
    pub diagnostics: Arc<Diagnostics>,
}

impl ApiState {
    pub fn new(gateway: CommandGateway, diagnostics: Diagnostics) -> Self {
        Self {
            gateway: Arc::new(gateway),
            diagnostics: Arc::new(diagnostics),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::MissingCommand | GatewayError::EmptyCommand => StatusCode::BAD_REQUEST,
            GatewayError::NotAllowed(_) => StatusCode::FORBIDDEN,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

impl IntoResponse for ToolError {
    fn into_response(self) -> Response {
        let status = match self {
            ToolError::InvalidServerId(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

impl IntoResponse for IpLookupError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_GATEWAY,
            Json(ErrorResponse::new(self.to_string())),
        )
            .into_response()
    }
}

/// Query string as ordered pairs.
///
/// Any query string parses, so the extractor never rejects with a plain-text
/// body. Repeated keys resolve to their first value.
pub type QueryPairs = Vec<(String, String)>;

/// First value of `key` in `pairs`
pub(crate) fn first_param<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Raw JSON bytes produced by a tool, passed through untouched
pub(crate) fn json_bytes(body: Vec<u8>) -> Response {
    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Create the router of gated endpoints
///
/// Routes:
/// - GET /ip - Public IP geolocation
/// - GET /speedtest - Run a speed test (`server` optional)
/// - GET /speedtest/servers - Nearby speed test servers
/// - GET /dns - Resolver configuration
/// - GET /interfaces - Network interfaces
/// - GET /exec - Allowlisted command (`cmd` required)
pub fn gated_router(state: ApiState) -> Router {
    Router::new()
        .route("/ip", get(network::ip_handler))
        .route("/speedtest", get(speedtest::speedtest_handler))
        .route("/speedtest/servers", get(speedtest::servers_handler))
        .route("/dns", get(network::dns_handler))
        .route("/interfaces", get(network::interfaces_handler))
        .route("/exec", get(exec::exec_handler))
        .with_state(state)
}
