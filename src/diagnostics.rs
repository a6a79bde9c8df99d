//! Network Diagnostics
//!
//! Thin wrappers around the host tools behind the read-only endpoints:
//! public IP lookup, speed test, resolver configuration and interface listing.

use crate::config::AgentConfig;
use reqwest::{Client, Url};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Timeout for the public IP lookup
const IP_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Flags passed to every speed test invocation
const SPEEDTEST_BASE_ARGS: [&str; 3] = ["--accept-license", "--accept-gdpr", "--format=json"];

/// Failure of a local diagnostic tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid server id: {0}")]
    InvalidServerId(String),
}

/// Failure of the upstream IP lookup
#[derive(Debug, Error)]
pub enum IpLookupError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("ip lookup returned status {0}")]
    Status(reqwest::StatusCode),
}

/// Parsed resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsInfo {
    pub servers: Vec<String>,
    pub raw: String,
}

/// Interface listing, structured when the lister supports JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceListing {
    /// `ip -j addr` output, already JSON
    Json(Vec<u8>),
    /// Plain `ip addr` text
    Raw(String),
}

/// Diagnostic tool runner
#[derive(Debug, Clone)]
pub struct Diagnostics {
    http: Client,
    ip_lookup_url: Url,
    resolv_conf: PathBuf,
    speedtest_bin: String,
    ip_bin: String,
}

impl Diagnostics {
    pub fn new(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(IP_LOOKUP_TIMEOUT).build()?;

        Ok(Self {
            http,
            ip_lookup_url: config.ip_lookup_url.clone(),
            resolv_conf: config.resolv_conf.clone(),
            speedtest_bin: config.speedtest_bin.clone(),
            ip_bin: config.ip_bin.clone(),
        })
    }

    /// Fetch the public IP geolocation document verbatim
    pub async fn lookup_public_ip(&self) -> Result<Vec<u8>, IpLookupError> {
        let response = self.http.get(self.ip_lookup_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IpLookupError::Status(status));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Run a speed test, optionally against a specific server
    pub async fn speedtest(&self, server_id: Option<&str>) -> Result<Vec<u8>, ToolError> {
        let args = speedtest_args(server_id)?;
        match server_id {
            Some(id) => info!(server = %id, "speedtest starting"),
            None => info!("speedtest starting (auto server)"),
        }

        run_tool(&self.speedtest_bin, &args).await.inspect_err(|e| {
            warn!(error = %e, "speedtest failed");
        })
    }

    /// List speed test servers near this host
    pub async fn speedtest_servers(&self) -> Result<Vec<u8>, ToolError> {
        let mut args: Vec<String> = SPEEDTEST_BASE_ARGS.iter().map(|a| a.to_string()).collect();
        args.push("--servers".to_string());

        run_tool(&self.speedtest_bin, &args).await.inspect_err(|e| {
            warn!(error = %e, "speedtest servers failed");
        })
    }

    /// Read and parse the resolver configuration
    pub async fn dns(&self) -> Result<DnsInfo, ToolError> {
        let raw = tokio::fs::read_to_string(&self.resolv_conf)
            .await
            .map_err(|source| ToolError::Read {
                path: self.resolv_conf.clone(),
                source,
            })?;

        Ok(DnsInfo {
            servers: parse_nameservers(&raw),
            raw,
        })
    }

    /// List interfaces, preferring the JSON output of the lister
    pub async fn interfaces(&self) -> Result<InterfaceListing, ToolError> {
        let json_args = ["-j".to_string(), "addr".to_string()];
        let err = match run_tool(&self.ip_bin, &json_args).await {
            Ok(out) => return Ok(InterfaceListing::Json(out)),
            Err(e) => e,
        };

        warn!(error = %err, "json interface listing failed, falling back to text");
        match run_tool(&self.ip_bin, &["addr".to_string()]).await {
            Ok(out) => Ok(InterfaceListing::Raw(String::from_utf8_lossy(&out).into_owned())),
            Err(_) => Err(err),
        }
    }
}

/// Build the speed test argument vector
pub fn speedtest_args(server_id: Option<&str>) -> Result<Vec<String>, ToolError> {
    let mut args: Vec<String> = SPEEDTEST_BASE_ARGS.iter().map(|a| a.to_string()).collect();

    if let Some(id) = server_id.filter(|id| !id.is_empty()) {
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ToolError::InvalidServerId(id.to_string()));
        }
        args.push(format!("--server-id={}", id));
    }

    Ok(args)
}

/// Extract `nameserver` addresses in file order
pub fn parse_nameservers(resolv_conf: &str) -> Vec<String> {
    resolv_conf
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("nameserver"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Run a tool and return its stdout. A non-zero exit is an error carrying
/// the tool's stderr.
async fn run_tool(program: &str, args: &[String]) -> Result<Vec<u8>, ToolError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ToolError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if output.status.success() {
        return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        Err(ToolError::Failed(format!("{} {}", program, output.status)))
    } else {
        Err(ToolError::Failed(stderr))
    }
}
