//! Session Authority Client
//!
//! The authority (the qBittorrent WebUI) owns the session store. This agent
//! never inspects a session token itself: it asks the authority whether the
//! token is good by replaying it as the `SID` cookie against the version
//! endpoint.

use reqwest::{header, Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Upper bound on every authority round trip
pub const AUTHORITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint used both for the bypass probe and for token validation
const VERSION_PATH: &str = "api/v2/app/version";

/// Cookie the authority expects the session id in
pub const SESSION_COOKIE: &str = "SID";

/// Why the authority did not accept a request
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority rejected session with status {0}")]
    Rejected(StatusCode),

    #[error("authority unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// HTTP client bound to a single authority base URL
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http: Client,
    version_url: Url,
}

impl AuthorityClient {
    /// Build a client for `base`. `allow_self_signed` relaxes certificate
    /// verification for this client only.
    pub fn new(base: &Url, allow_self_signed: bool) -> Result<Self, AuthorityError> {
        let http = Client::builder()
            .timeout(AUTHORITY_TIMEOUT)
            .danger_accept_invalid_certs(allow_self_signed)
            .build()?;

        Ok(Self {
            http,
            version_url: version_url(base),
        })
    }

    /// URL hit by both the probe and validation
    pub fn version_url(&self) -> &Url {
        &self.version_url
    }

    /// Unauthenticated probe. Returns true when the authority answers without
    /// asking for credentials.
    pub async fn probe(&self) -> bool {
        match self.http.get(self.version_url.clone()).send().await {
            Ok(response) => {
                debug!(status = %response.status(), "authority probe answered");
                response.status().is_success()
            }
            Err(e) => {
                debug!(error = %e, "authority probe failed");
                false
            }
        }
    }

    /// Ask the authority whether `token` is a live session.
    pub async fn validate(&self, token: &str) -> Result<(), AuthorityError> {
        let response = self
            .http
            .get(self.version_url.clone())
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthorityError::Rejected(status))
        }
    }
}

fn version_url(base: &Url) -> Url {
    // Url::join drops the last path segment unless the base ends with '/'
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(VERSION_PATH).unwrap_or(base)
}
