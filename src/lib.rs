//! Net Agent
//!
//! Small HTTP agent exposing network diagnostics next to a qBittorrent
//! instance, reusing its WebUI sessions for authentication.
//!
//! # Features
//!
//! - **Delegated Auth**: session tokens validated by the qBittorrent WebUI,
//!   with a one-time bypass when the WebUI itself requires no login
//! - **Command Gateway**: allowlisted, shell-less execution of network tools
//! - **Diagnostics**: public IP, speed test, resolver config, interfaces
//!
//! # Architecture
//!
//! ```text
//! client ──► logging ──► auth gate ──► handlers ──► diagnostics
//!                            │             │
//!                            ▼             └──► command gateway ──► child process
//!                     qBittorrent WebUI
//!                   (/api/v2/app/version)
//! ```

pub mod agent;
pub mod authority;
pub mod config;
pub mod diagnostics;
pub mod gateway;

pub use agent::{AgentServer, AuthDecision, AuthMode, GateState, RejectReason};
pub use authority::{AuthorityClient, AuthorityError};
pub use config::AgentConfig;
pub use diagnostics::{Diagnostics, DnsInfo, InterfaceListing, IpLookupError, ToolError};
pub use gateway::{
    AllowedCommandSet, CommandGateway, CommandRequest, CommandResult, GatewayError,
    DEFAULT_ALLOWED_COMMANDS,
};
