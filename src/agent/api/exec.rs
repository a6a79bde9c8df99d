//! Command Execution API
//!
//! HTTP face of the [`CommandGateway`](crate::gateway::CommandGateway).
//! Rejections map to 400/403; anything that happens after the child is
//! spawned is a 200 with the failure in the body.

use super::{first_param, ApiState, QueryPairs};
use crate::gateway::{CommandResult, GatewayError};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ExecResponse {
    /// Combined stdout and stderr
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CommandResult> for ExecResponse {
    fn from(result: CommandResult) -> Self {
        Self {
            output: result.output_lossy(),
            error: result.error,
        }
    }
}

/// GET /exec?cmd=...
///
/// The child is tied to this future: if the client disconnects, axum drops
/// the handler and the child is killed.
pub async fn exec_handler(
    State(state): State<ApiState>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<ExecResponse>, GatewayError> {
    let raw = first_param(&params, "cmd").unwrap_or_default();
    let result = state.gateway.execute(raw).await?;
    Ok(Json(result.into()))
}
