//! HTTP surface for emissary.
//!
//! Exposes the chat endpoint the embedded widget talks to, plus a health
//! check and a small persona endpoint for the page header.
//!
//! Built on Axum. Per-session history lives with the client: every chat
//! request carries the full prior history, and the client commits a turn
//! only after a successful reply — a failed turn changes nothing.

pub mod frontend;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use emissary_agent::AgentLoop;
use emissary_core::message::Message;
use emissary_persona::{Persona, PersonaPaths};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentLoop>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/persona", get(persona_handler))
        .route("/v1/chat", post(chat_handler))
        .with_state(state)
        .merge(frontend::frontend_router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the persona, provider, notification sink, tool registry, and
/// conversation loop once, then serves until interrupted.
pub async fn start(config: emissary_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let agent = Arc::new(build_agent(&config)?);
    let state = Arc::new(GatewayState { agent });

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the conversation loop from configuration.
pub fn build_agent(
    config: &emissary_config::AppConfig,
) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let endpoint = config
        .provider
        .endpoint
        .clone()
        .ok_or("provider.endpoint is not set (or AZURE_OPENAI_ENDPOINT)")?;
    let api_key = config
        .provider
        .api_key
        .clone()
        .ok_or("provider.api_key is not set (or AZURE_OPENAI_API_KEY)")?;

    let provider = Arc::new(emissary_providers::AzureOpenAiProvider::new(
        endpoint,
        api_key,
        config.provider.api_version.clone(),
    ));

    if config.pushover.token.is_none() || config.pushover.user_key.is_none() {
        warn!("Pushover credentials not set; notifications will be dropped by the endpoint");
    }
    let notifier = Arc::new(emissary_notify::PushoverNotifier::new(
        config.pushover.token.clone().unwrap_or_default(),
        config.pushover.user_key.clone().unwrap_or_default(),
    ));

    let persona = Persona::load(&PersonaPaths {
        name: config.persona.name.clone(),
        resume_path: config.persona.resume_path.clone(),
        experience_path: config.persona.experience_path.clone(),
    })?;

    let tools = Arc::new(emissary_tools::registry(notifier));
    let event_bus = Arc::new(emissary_core::event::EventBus::default());

    let mut agent = AgentLoop::new(
        provider,
        &config.provider.deployment,
        config.agent.temperature,
        tools,
        persona,
        event_bus,
    )
    .with_max_tool_rounds(config.agent.max_tool_rounds);
    if let Some(max_tokens) = config.agent.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }

    Ok(agent)
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct PersonaResponse {
    name: String,
}

async fn persona_handler(State(state): State<SharedState>) -> Json<PersonaResponse> {
    Json(PersonaResponse {
        name: state.agent.persona().name.clone(),
    })
}

/// One prior turn as the widget sends it.
#[derive(Debug, Deserialize)]
struct ChatTurn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut history = Vec::with_capacity(payload.history.len());
    for turn in &payload.history {
        let message = match turn.role.as_str() {
            "user" => Message::user(&turn.content),
            "assistant" => Message::assistant(&turn.content),
            other => {
                return Err((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ErrorResponse {
                        error: format!("history role must be user or assistant, got {other:?}"),
                    }),
                ));
            }
        };
        history.push(message);
    }

    info!(
        message_len = payload.message.len(),
        history_len = history.len(),
        "Chat request received"
    );

    match state.agent.chat(&payload.message, &history).await {
        Ok(reply) => Ok(Json(ChatResponse { reply })),
        Err(e) => {
            error!(error = %e, "Turn failed");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}
