//! Gateway HTTP server.

use crate::agent::InteractionRuntimeFactory;
use crate::config::{self, Config};
use crate::gateway::error::ApiError;
use crate::gateway::protocol::{BridgeRequest, BridgeResponse, Health};
use crate::session::SessionManager;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

pub const BRIDGE_PATH: &str = "/api/v1/bridge/imessage";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
    /// When Some, bridge requests must send `Authorization: Bearer <token>`.
    pub required_token: Option<String>,
    /// Reported by the health endpoint.
    pub port: u16,
}

impl GatewayState {
    pub fn new(sessions: SessionManager, required_token: Option<String>, port: u16) -> Self {
        Self {
            sessions: Arc::new(sessions),
            required_token: required_token.filter(|t| !t.trim().is_empty()),
            port,
        }
    }
}

/// Routes: `GET /` (health) and `POST /api/v1/bridge/imessage`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route(BRIDGE_PATH, post(bridge_imessage))
        .with_state(state)
}

/// Run the gateway until Ctrl+C or SIGTERM.
/// Refuses to bind a non-loopback address unless a gateway token is configured.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let token = config::resolve_gateway_token(&config, &config::process_env);
    if !config::is_loopback_bind(&bind) && token.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without a token; set gateway.auth.token or MURMUR_GATEWAY_TOKEN",
            bind
        );
    }

    let factory = InteractionRuntimeFactory::from_config(&config);
    log::info!("gateway: agent model {}", factory.model());
    let sessions = SessionManager::with_capacity(factory, config.gateway.max_sessions);
    let state = GatewayState::new(sessions, token, config.gateway.port);
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::shutdown::wait_for_shutdown())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

fn check_token(state: &GatewayState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.required_token.as_deref() else {
        return Ok(());
    };
    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_credentials);
    if provided == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("missing or invalid bearer token"))
    }
}

/// Credentials of a `Bearer` authorization value. The scheme name is case-insensitive.
fn bearer_credentials(value: &str) -> Option<&str> {
    let (scheme, rest) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(rest.trim())
}

/// POST /api/v1/bridge/imessage: validate, run through the session, return the reply.
async fn bridge_imessage(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<BridgeResponse>, ApiError> {
    check_token(&state, &headers)?;
    let req: BridgeRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))?;
    req.validate().map_err(ApiError::bad_request)?;

    log::debug!("gateway: message for {}", req.conversation_id);
    let reply = state
        .sessions
        .process_message(&req.conversation_id, &req.message)
        .await?;
    Ok(Json(BridgeResponse { reply }))
}

/// GET / returns a simple health JSON.
async fn health_http(State(state): State<GatewayState>) -> Json<Health> {
    Json(Health {
        runtime: "running".to_string(),
        sessions: state.sessions.len(),
        port: state.port,
    })
}
