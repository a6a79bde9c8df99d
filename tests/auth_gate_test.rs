//! End-to-end checks of the auth gate and command gateway against a fake
//! qBittorrent WebUI running on an ephemeral port.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use net_agent::agent::api::ApiState;
use net_agent::{
    AgentConfig, AgentServer, AllowedCommandSet, AuthMode, AuthorityClient, CommandGateway,
    Diagnostics, GateState,
};
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const GOOD_SID: &str = "good-token";

#[derive(Clone)]
struct AuthorityState {
    calls: Arc<AtomicUsize>,
    /// Accept requests without any session
    open: bool,
}

struct FakeAuthority {
    addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl FakeAuthority {
    async fn spawn(open: bool) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/api/v2/app/version", get(version))
            .with_state(AuthorityState {
                calls: calls.clone(),
                open,
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, calls }
    }

    fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn version(State(state): State<AuthorityState>, headers: HeaderMap) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);

    let cookie = headers.get(header::COOKIE).and_then(|v| v.to_str().ok());
    if state.open || cookie == Some(format!("SID={}", GOOD_SID).as_str()) {
        (StatusCode::OK, "v4.6.5").into_response()
    } else {
        (StatusCode::FORBIDDEN, "Forbidden").into_response()
    }
}

/// URL of a port nothing listens on
async fn closed_port_url() -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}", addr)).unwrap()
}

async fn agent(authority_url: Url, allowed: &[&str]) -> AgentServer {
    let config = AgentConfig {
        authority_url: authority_url.clone(),
        ..Default::default()
    };
    let authority = AuthorityClient::new(&authority_url, false).unwrap();
    let gate = GateState::detect(authority).await;
    let gateway = CommandGateway::new(
        AllowedCommandSet::new(allowed.iter().copied()),
        Duration::from_secs(10),
    );
    let diagnostics = Diagnostics::new(&config).unwrap();

    AgentServer::new(config, gate, ApiState::new(gateway, diagnostics))
}

async fn send(server: &AgentServer, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = server.build_router().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn get_with_header(uri: &str, sid: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-QBT-SID", sid)
        .body(Body::empty())
        .unwrap()
}

fn get_with_cookie(uri: &str, sid: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("SID={}", sid))
        .body(Body::empty())
        .unwrap()
}

fn get_plain(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_open_authority_enables_bypass() {
    let authority = FakeAuthority::spawn(true).await;
    let server = agent(authority.url(), &["echo"]).await;

    assert_eq!(server.gate().mode(), AuthMode::Bypass);
    assert_eq!(authority.calls(), 1, "only the startup probe");

    let (status, json) = send(&server, get_plain("/exec?cmd=echo%20ok")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["output"], "ok\n");

    let (status, _) = send(&server, get_with_header("/exec?cmd=echo%20ok", "junk")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(authority.calls(), 1, "bypass must never validate");
}

#[tokio::test]
async fn test_closed_authority_requires_sid() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &["echo"]).await;

    assert_eq!(server.gate().mode(), AuthMode::Delegated);
    let after_probe = authority.calls();

    let (status, json) = send(&server, get_plain("/exec?cmd=echo%20ok")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json, serde_json::json!({"error": "missing SID"}));

    assert_eq!(authority.calls(), after_probe, "no token, no upstream call");
    assert_eq!(server.gateway().spawn_count(), 0);
}

#[tokio::test]
async fn test_valid_sid_validates_once_per_request() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &["echo"]).await;
    let after_probe = authority.calls();

    let (status, json) = send(&server, get_with_header("/exec?cmd=echo%20hi", GOOD_SID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"output": "hi\n"}));
    assert_eq!(authority.calls(), after_probe + 1);

    let (status, _) = send(&server, get_with_cookie("/exec?cmd=echo%20hi", GOOD_SID)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(authority.calls(), after_probe + 2, "no caching between requests");
}

#[tokio::test]
async fn test_header_takes_precedence_over_cookie() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &["echo"]).await;

    let request = Request::builder()
        .uri("/exec?cmd=echo%20hi")
        .header("X-QBT-SID", "stale-token")
        .header(header::COOKIE, format!("SID={}", GOOD_SID))
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&server, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "invalid SID");
}

#[tokio::test]
async fn test_rejected_and_unreachable_look_identical() {
    let authority = FakeAuthority::spawn(false).await;
    let rejecting = agent(authority.url(), &["echo"]).await;
    let (rejected_status, rejected_body) =
        send(&rejecting, get_with_header("/dns", "bad-token")).await;

    let unreachable = agent(closed_port_url().await, &["echo"]).await;
    assert_eq!(unreachable.gate().mode(), AuthMode::Delegated);
    let (unreachable_status, unreachable_body) =
        send(&unreachable, get_with_header("/dns", GOOD_SID)).await;

    assert_eq!(rejected_status, StatusCode::UNAUTHORIZED);
    assert_eq!(rejected_status, unreachable_status);
    assert_eq!(rejected_body, unreachable_body);
    assert_eq!(rejected_body, serde_json::json!({"error": "invalid SID"}));
}

#[tokio::test]
async fn test_forbidden_command_after_auth() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &["echo"]).await;

    let (status, json) = send(&server, get_with_header("/exec?cmd=rm%20-rf%20/", GOOD_SID)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json, serde_json::json!({"error": "command not allowed: rm"}));
    assert_eq!(server.gateway().spawn_count(), 0);
}

#[tokio::test]
async fn test_failing_command_is_ok_with_error() {
    let authority = FakeAuthority::spawn(true).await;
    let server = agent(authority.url(), &["ls"]).await;

    let (status, json) = send(&server, get_plain("/exec?cmd=ls%20/no/such/dir/here")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["output"].as_str().unwrap().contains("/no/such/dir/here"));
    assert!(json["error"].as_str().unwrap().starts_with("exit status"));
}

#[tokio::test]
async fn test_health_never_calls_authority() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &[]).await;
    let after_probe = authority.calls();

    let (status, json) = send(&server, get_plain("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(authority.calls(), after_probe);
}

#[tokio::test]
async fn test_from_config_probes_authority() {
    let authority = FakeAuthority::spawn(true).await;
    let config = AgentConfig {
        authority_url: authority.url(),
        ..Default::default()
    };

    let server = AgentServer::from_config(config).await.unwrap();
    assert_eq!(server.gate().mode(), AuthMode::Bypass);
    assert_eq!(server.gateway().allowed(), &AllowedCommandSet::default());
}

#[tokio::test]
#[ignore = "requires ping and ICMP on loopback"]
async fn test_ping_loopback() {
    let authority = FakeAuthority::spawn(false).await;
    let server = agent(authority.url(), &["ping"]).await;

    let (status, json) = send(
        &server,
        get_with_header("/exec?cmd=ping%20-c%201%20127.0.0.1", GOOD_SID),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["output"].as_str().unwrap().contains("1 packets transmitted"));
    assert!(json.get("error").is_none());
}
