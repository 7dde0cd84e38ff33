//! HTTP request handlers

use super::types::HealthResponse;
use super::ws::relay_socket;
use super::AppState;
use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use quick_xml::escape::escape;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Call setup document requested by the phone platform
        .route("/twiml", get(twiml).post(twiml))
        // Relay socket
        .route("/ws", get(relay_socket))
        .route("/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Call Setup
// ============================================================

async fn twiml(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let host = state
        .config
        .public_host
        .clone()
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("localhost:{}", state.config.port));

    if state.config.public_host.is_none() {
        tracing::debug!(host = %host, "No public host configured, using request host");
    }

    (
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_document(&host, &state.config.welcome_greeting),
    )
}

fn twiml_document(host: &str, greeting: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <ConversationRelay url="wss://{}/ws" welcomeGreeting="{}" />
  </Connect>
</Response>"#,
        escape(host),
        escape(greeting)
    )
}

// ============================================================
// Status
// ============================================================

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_sessions: state.relay.store().len().await,
    })
}

async fn get_version() -> &'static str {
    concat!("voice_relay ", env!("CARGO_PKG_VERSION"))
}
