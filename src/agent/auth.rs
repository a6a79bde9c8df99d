//! Delegated Authentication Gate
//!
//! The agent keeps no session state. Each gated request is admitted in one of
//! two ways:
//!
//! - **Bypass**: at startup the authority answered an unauthenticated probe,
//!   so it is configured without credentials. Every request is admitted and no
//!   validation call is ever made. Decided once; never re-evaluated.
//! - **Delegated**: the request's session token (header `X-QBT-SID`, falling
//!   back to cookie `SID`) is replayed against the authority. One round trip
//!   per request, no caching.
//!
//! A rejected token and an unreachable authority are logged separately but
//! answer the caller identically (fail closed).

use crate::authority::{AuthorityClient, AuthorityError, SESSION_COOKIE};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::api::ErrorResponse;

/// Header carrying the session token
pub const SESSION_HEADER: &str = "X-QBT-SID";

/// How the gate admits requests, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Authority needs no credentials; admit everything
    Bypass,
    /// Validate every request against the authority
    Delegated,
}

impl AuthMode {
    /// Probe the authority once and pick the mode
    pub async fn detect(authority: &AuthorityClient) -> Self {
        if authority.probe().await {
            Self::Bypass
        } else {
            Self::Delegated
        }
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    UpstreamRejected,
    UpstreamUnreachable,
}

/// Outcome of the gate for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Bypassed,
    Authorized,
    Rejected(RejectReason),
}

/// Caller-facing authentication failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing SID")]
    MissingSid,

    #[error("invalid SID")]
    InvalidSid,
}

impl From<RejectReason> for AuthError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MissingToken => AuthError::MissingSid,
            RejectReason::UpstreamRejected | RejectReason::UpstreamUnreachable => {
                AuthError::InvalidSid
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.to_string()));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Gate state shared by every request
#[derive(Debug)]
pub struct GateState {
    mode: AuthMode,
    authority: AuthorityClient,
}

impl GateState {
    pub fn new(mode: AuthMode, authority: AuthorityClient) -> Self {
        Self { mode, authority }
    }

    /// Probe the authority and build the gate
    pub async fn detect(authority: AuthorityClient) -> Self {
        let mode = AuthMode::detect(&authority).await;
        if mode == AuthMode::Bypass {
            info!("qBittorrent auth bypass detected, SID validation disabled");
        }
        Self::new(mode, authority)
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// Decide whether a request carrying `headers` may proceed
    pub async fn decide(&self, headers: &HeaderMap, jar: &CookieJar) -> AuthDecision {
        if self.mode == AuthMode::Bypass {
            return AuthDecision::Bypassed;
        }

        let Some(token) = extract_session_token(headers, jar) else {
            return AuthDecision::Rejected(RejectReason::MissingToken);
        };

        match self.authority.validate(&token).await {
            Ok(()) => AuthDecision::Authorized,
            Err(AuthorityError::Rejected(status)) => {
                debug!(status = %status, "authority rejected session");
                AuthDecision::Rejected(RejectReason::UpstreamRejected)
            }
            Err(AuthorityError::Unreachable(e)) => {
                warn!(error = %e, "authority unreachable during validation");
                AuthDecision::Rejected(RejectReason::UpstreamUnreachable)
            }
        }
    }
}

/// Session token from the header, or the cookie when the header is absent
pub fn extract_session_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            jar.get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .filter(|v| !v.is_empty())
        })
}

/// Authentication middleware
pub async fn auth_middleware(
    State(gate): State<Arc<GateState>>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match gate.decide(req.headers(), &jar).await {
        AuthDecision::Bypassed | AuthDecision::Authorized => Ok(next.run(req).await),
        AuthDecision::Rejected(reason) => {
            let error = AuthError::from(reason);
            warn!(
                path = %req.uri().path(),
                reason = ?reason,
                "auth failed: {}",
                error
            );
            Err(error)
        }
    }
}
