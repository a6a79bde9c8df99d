//! Network Status API
//!
//! Public IP, resolver configuration and interface listing.

use super::{json_bytes, ApiState};
use crate::diagnostics::{DnsInfo, InterfaceListing, IpLookupError, ToolError};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

/// GET /ip
pub async fn ip_handler(State(state): State<ApiState>) -> Result<Response, IpLookupError> {
    let body = state
        .diagnostics
        .lookup_public_ip()
        .await
        .inspect_err(|e| warn!(error = %e, "ip lookup failed"))?;

    Ok(json_bytes(body))
}

/// GET /dns
pub async fn dns_handler(State(state): State<ApiState>) -> Result<Json<DnsInfo>, ToolError> {
    let info = state
        .diagnostics
        .dns()
        .await
        .inspect_err(|e| warn!(error = %e, "dns lookup failed"))?;

    Ok(Json(info))
}

/// GET /interfaces
pub async fn interfaces_handler(State(state): State<ApiState>) -> Result<Response, ToolError> {
    let listing = state
        .diagnostics
        .interfaces()
        .await
        .inspect_err(|e| warn!(error = %e, "interface listing failed"))?;

    Ok(match listing {
        InterfaceListing::Json(body) => json_bytes(body),
        InterfaceListing::Raw(raw) => Json(json!({ "raw": raw })).into_response(),
    })
}
