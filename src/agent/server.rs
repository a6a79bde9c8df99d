//! Agent HTTP Server
//!
//! Axum server with the auth gate, request logging, and graceful shutdown.

use crate::agent::api::{gated_router, health::HealthState, health_router, ApiState};
use crate::agent::auth::{auth_middleware, GateState};
use crate::agent::logging::request_logging_layer;
use crate::authority::AuthorityClient;
use crate::config::AgentConfig;
use crate::diagnostics::Diagnostics;
use crate::gateway::{AllowedCommandSet, CommandGateway};
use anyhow::{Context, Result};
use axum::{middleware, Router};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Agent server
pub struct AgentServer {
    config: AgentConfig,
    gate: Arc<GateState>,
    api: ApiState,
    health: Arc<HealthState>,
}

impl AgentServer {
    /// Assemble a server from already-built parts
    pub fn new(config: AgentConfig, gate: GateState, api: ApiState) -> Self {
        Self {
            config,
            gate: Arc::new(gate),
            api,
            health: Arc::new(HealthState::new()),
        }
    }

    /// Build every collaborator from `config`, probing the authority once to
    /// settle the auth mode for the lifetime of the process.
    pub async fn from_config(config: AgentConfig) -> Result<Self> {
        let authority =
            AuthorityClient::new(&config.authority_url, config.allow_self_signed_certs)
                .context("Failed to build authority client")?;
        let gate = GateState::detect(authority).await;

        let gateway = CommandGateway::new(AllowedCommandSet::default(), config.exec_timeout);
        let diagnostics =
            Diagnostics::new(&config).context("Failed to build diagnostics client")?;

        Ok(Self::new(config, gate, ApiState::new(gateway, diagnostics)))
    }

    /// Build the router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let gated = gated_router(self.api.clone()).route_layer(middleware::from_fn_with_state(
            self.gate.clone(),
            auth_middleware,
        ));

        Router::new()
            .merge(health_router(self.health.clone()))
            .merge(gated)
            .layer(request_logging_layer())
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr();
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(
            "net-agent listening on {} (qbt: {})",
            addr, self.config.authority_url
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shut down gracefully");
        Ok(())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn gate(&self) -> &GateState {
        &self.gate
    }

    pub fn gateway(&self) -> &CommandGateway {
        &self.api.gateway
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
