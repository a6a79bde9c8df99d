//! Configuration management

use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default listening port
const DEFAULT_PORT: u16 = 9999;

/// Default authority (qBittorrent WebUI) address
const DEFAULT_AUTHORITY_URL: &str = "http://localhost:8080";

/// Default deadline for `/exec` children
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;

/// Default public IP geolocation endpoint
const DEFAULT_IP_LOOKUP_URL: &str = "https://ipinfo.io/json";

/// Agent configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Listening address (default: all interfaces)
    pub bind_addr: IpAddr,

    /// Listening port
    pub port: u16,

    /// Base URL of the session authority
    pub authority_url: Url,

    /// Skip TLS certificate verification for the authority only
    pub allow_self_signed_certs: bool,

    /// Deadline applied to every `/exec` child process
    pub exec_timeout: Duration,

    /// Public IP geolocation endpoint proxied by `/ip`
    pub ip_lookup_url: Url,

    /// Resolver configuration read by `/dns`
    pub resolv_conf: PathBuf,

    /// Speed test executable
    pub speedtest_bin: String,

    /// Interface lister executable
    pub ip_bin: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            authority_url: Url::parse(DEFAULT_AUTHORITY_URL).expect("valid default authority url"),
            allow_self_signed_certs: false,
            exec_timeout: Duration::from_secs(DEFAULT_EXEC_TIMEOUT_SECS),
            ip_lookup_url: Url::parse(DEFAULT_IP_LOOKUP_URL).expect("valid default lookup url"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            speedtest_bin: "speedtest".to_string(),
            ip_bin: "ip".to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = non_empty(lookup("BIND_ADDR")) {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("BIND_ADDR is not an IP address: {}", addr))?;
        }

        if let Some(port) = non_empty(lookup("PORT")) {
            config.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port: {}", port))?;
        }

        if let Some(url) = non_empty(lookup("QBT_URL")) {
            config.authority_url = parse_http_url("QBT_URL", &url)?;
        }

        config.allow_self_signed_certs = lookup("ALLOW_SELF_SIGNED_CERTS")
            .map(|v| v == "true")
            .unwrap_or(false);

        if let Some(secs) = non_empty(lookup("EXEC_TIMEOUT_SECS")) {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("EXEC_TIMEOUT_SECS is not a number: {}", secs))?;
            if secs == 0 {
                bail!("EXEC_TIMEOUT_SECS must be greater than zero");
            }
            config.exec_timeout = Duration::from_secs(secs);
        }

        if let Some(url) = non_empty(lookup("IP_LOOKUP_URL")) {
            config.ip_lookup_url = parse_http_url("IP_LOOKUP_URL", &url)?;
        }

        if let Some(path) = non_empty(lookup("RESOLV_CONF")) {
            config.resolv_conf = PathBuf::from(path);
        }

        if let Some(bin) = non_empty(lookup("SPEEDTEST_BIN")) {
            config.speedtest_bin = bin;
        }

        if let Some(bin) = non_empty(lookup("IP_BIN")) {
            config.ip_bin = bin;
        }

        Ok(config)
    }

    /// Get the socket address to listen on
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_http_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("{} is not a valid URL: {}", name, raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("{} must use http or https, got {}", name, other),
    }
}
