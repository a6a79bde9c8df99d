//! Agent HTTP Surface
//!
//! # Security Model
//!
//! - **/health** is the only ungated route
//! - **Everything else** passes the delegated auth gate first
//! - **/exec** additionally passes the command allowlist
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                Agent Server                 │
//! ├─────────────────────────────────────────────┤
//! │  request logging (every route)              │
//! │  GET /health            → Liveness          │
//! │  ── auth gate ───────────────────────────── │
//! │  GET /ip                → Public IP lookup  │
//! │  GET /speedtest         → Speed test        │
//! │  GET /speedtest/servers → Speed test hosts  │
//! │  GET /dns               → Resolver config   │
//! │  GET /interfaces        → Interface list    │
//! │  GET /exec?cmd=...      → Command gateway   │
//! └─────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod logging;
pub mod server;

pub use api::{gated_router, health_router, ApiState, ErrorResponse};
pub use auth::{
    auth_middleware, extract_session_token, AuthDecision, AuthError, AuthMode, GateState,
    RejectReason, SESSION_HEADER,
};
pub use server::AgentServer;
