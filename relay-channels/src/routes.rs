//! HTTP routes for the relay.
//!
//! - Session control surface (create, view, prompt, history, QR, teardown)
//! - Sidecar event webhook
//! - Health endpoints

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::RelayError;
use crate::qr::png_data_url;
use crate::session::{SessionRegistry, SessionSummary};
use crate::sidecar::SidecarEvent;

/// Session view served for every session id.
const SESSION_PAGE: &str = include_str!("../assets/session.html");

// ============================================================================
// State
// ============================================================================

/// Shared state for the relay HTTP server.
pub struct AppState {
    pub registry: SessionRegistry,
}

impl AppState {
    pub fn new(registry: SessionRegistry) -> Arc<Self> {
        Arc::new(Self { registry })
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SuccessResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    destroyed: Option<bool>,
}

impl SuccessResponse {
    fn ok() -> Self {
        Self {
            success: true,
            destroyed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetPromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
struct QrBase64Response {
    base64: String,
}

#[derive(Debug, Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionSummary>,
}

// ============================================================================
// Health
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "relay",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.registry.len().await,
    })
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            service: "relay",
            version: env!("CARGO_PKG_VERSION"),
            sessions: state.registry.len().await,
        }),
    )
}

// ============================================================================
// Sessions
// ============================================================================

async fn new_session(State(state): State<Arc<AppState>>) -> Result<Redirect, RelayError> {
    let id = state.registry.create().await?;
    Ok(Redirect::to(&format!("/session/{id}")))
}

/// Static page; the id is read client-side, so unknown ids still render.
async fn session_view(Path(_id): Path<String>) -> Html<&'static str> {
    Html(SESSION_PAGE)
}

async fn destroy_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let destroyed = state.registry.destroy(&id).await;
    Json(SuccessResponse {
        success: true,
        destroyed: Some(destroyed),
    })
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SessionListResponse {
        sessions: state.registry.list().await,
    })
}

async fn set_prompt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SetPromptRequest>,
) -> Result<Json<SuccessResponse>, RelayError> {
    state.registry.set_prompt(&id, request.prompt).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, RelayError> {
    state.registry.clear_history(&id, &user_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

// ============================================================================
// QR
// ============================================================================

async fn qr_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    let png = state.registry.qr_image(&id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

async fn qr_base64(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QrBase64Response>, RelayError> {
    let png = state.registry.qr_image(&id).await?;
    Ok(Json(QrBase64Response {
        base64: png_data_url(&png),
    }))
}

// ============================================================================
// Sidecar Webhook
// ============================================================================

async fn sidecar_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<SidecarEvent>,
) -> Result<impl IntoResponse, RelayError> {
    let event = event
        .into_client_event()
        .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
    let kind = event.kind();

    let sender = state.registry.event_sender(&id).await?;
    sender
        .send(event)
        .await
        .map_err(|_| RelayError::SessionNotFound(id.clone()))?;

    tracing::debug!(session_id = %id, event = kind, "Sidecar event accepted");
    Ok((StatusCode::ACCEPTED, Json(SuccessResponse::ok())))
}

// ============================================================================
// Routers
// ============================================================================

/// Build the multi-session server router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Session control surface
        .route("/sessions", get(list_sessions))
        .route("/session/new", get(new_session))
        .route("/session/:id", get(session_view).delete(destroy_session))
        .route("/session/:id/set-prompt", post(set_prompt))
        .route("/session/:id/clear-history/:user_id", post(clear_history))
        .route("/qr/:id", get(qr_image))
        .route("/qr/:id/base64", get(qr_base64))
        // Sidecar events
        .route("/webhooks/sidecar/:id", post(sidecar_webhook))
        .with_state(state)
}

/// Build the single-session bot router: health and sidecar events only.
pub fn build_bot_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/webhooks/sidecar/:id", post(sidecar_webhook))
        .with_state(state)
}

