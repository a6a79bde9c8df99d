//! Speed Test API

use super::{first_param, json_bytes, ApiState, QueryPairs};
use crate::diagnostics::ToolError;
use axum::{
    extract::{Query, State},
    response::Response,
};

/// GET /speedtest?server=<id>
///
/// The server is auto-selected when `server` is absent.
pub async fn speedtest_handler(
    State(state): State<ApiState>,
    Query(params): Query<QueryPairs>,
) -> Result<Response, ToolError> {
    let out = state
        .diagnostics
        .speedtest(first_param(&params, "server"))
        .await?;
    Ok(json_bytes(out))
}

/// GET /speedtest/servers
pub async fn servers_handler(State(state): State<ApiState>) -> Result<Response, ToolError> {
    let out = state.diagnostics.speedtest_servers().await?;
    Ok(json_bytes(out))
}
