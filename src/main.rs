//! Voice relay
//!
//! Bridges a phone platform's conversation-relay WebSocket to a streaming
//! chat completion model with tools.

mod api;
mod config;
mod conversation;
mod interrupt;
mod llm;
mod runtime;
mod state_machine;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use config::RelayConfig;
use conversation::ConversationStore;
use llm::{LoggingService, OpenAIService};
use runtime::{EventForwarder, HttpForwarder, NoopForwarder, Relay, ServiceLlmClient, ToolRegistryExecutor};
use std::net::SocketAddr;
use std::sync::Arc;
use system_prompt::SYSTEM_PROMPT;
use tools::ToolRegistry;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_relay=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = RelayConfig::from_env()?;

    // Model client
    let openai = OpenAIService::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        &config.openai_base_url,
    )?
    .with_max_tokens(config.openai_max_tokens);
    let llm = ServiceLlmClient::new(Arc::new(LoggingService::new(Arc::new(openai))));
    tracing::info!(model = %config.openai_model, base_url = %config.openai_base_url, "Model client initialized");

    // Tools
    let http = reqwest::Client::new();
    if config.webhook_url.is_none() {
        tracing::warn!("WEBHOOK_API_URL not set, calendar scheduling disabled");
    }
    let registry = ToolRegistry::standard(http.clone(), config.webhook_url.clone());
    tracing::info!(
        tools = ?registry.definitions().iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        "Tools registered"
    );

    // Event mirroring
    let forwarder: Arc<dyn EventForwarder> = match &config.forward_url {
        Some(url) => {
            tracing::info!(url = %url, "Forwarding outbound events");
            Arc::new(HttpForwarder::new(http, url.clone()))
        }
        None => Arc::new(NoopForwarder),
    };

    let store = Arc::new(ConversationStore::new(SYSTEM_PROMPT));
    let relay = Relay::new(
        store,
        Arc::new(llm),
        Arc::new(ToolRegistryExecutor::new(registry)),
        forwarder,
    );

    match &config.public_host {
        Some(host) => tracing::info!(host = %host, "Relay socket at wss://{host}/ws"),
        None => tracing::warn!("NGROK_URL not set, call setup will use the request host"),
    }

    let port = config.port;
    let state = AppState::new(relay, config);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Voice relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
