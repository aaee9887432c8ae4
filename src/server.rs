use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::handlers::{AssistantHandler, ScanPipeline};
use crate::models::{AnalysisOutcome, ChatMessage};
use crate::services::error::RelayError;
use crate::services::relay::MISSING_KEY_MESSAGE;
use crate::services::{bmi, CompletionProvider, GroqClient, ProviderRelay};

const INVALID_BODY_MESSAGE: &str = "Invalid request body. 'messages' array is required.";

pub struct AppState {
    /// `None` when no credential is configured; `/api/chat` then answers 500.
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub scanner: ScanPipeline,
    pub assistant: AssistantHandler,
}

impl AppState {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>, config: &Config) -> Self {
        let relay = Arc::new(ProviderRelay::new(provider.clone()));
        Self {
            provider,
            scanner: ScanPipeline::new(relay.clone(), config.timeout),
            assistant: AssistantHandler::new(relay, config.timeout),
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_relay_handler))
        .route("/api/scan", post(scan_handler))
        .route("/api/assistant", post(assistant_handler))
        .route("/api/bmi", post(bmi_handler))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(log_requests))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Binds the relay server and runs it until Ctrl+C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let provider: Option<Arc<dyn CompletionProvider>> = match config.require_api_key() {
        Ok(key) => {
            let groq = GroqClient::from_config(config, key);
            log::info!("✅ Groq API key loaded, model: {}", groq.model());
            Some(Arc::new(groq) as Arc<dyn CompletionProvider>)
        }
        Err(e) => {
            log::error!("🚨 CRITICAL: {}. AI features will answer 500 until it is configured.", e);
            None
        }
    };

    let app = create_router(Arc::new(AppState::new(provider, config)));

    let listener = tokio::net::TcpListener::bind(&config.relay_addr).await?;
    log::info!("🌐 Relay server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

async fn log_requests(request: Request, next: Next) -> Response {
    log::info!("{} {}", request.method(), request.uri());
    next.run(request).await
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// `POST /api/chat`: forwards the message list upstream and returns the
/// provider's completion untouched.
async fn chat_relay_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    let Some(provider) = state.provider.as_ref() else {
        log::error!("❌ Groq API key missing during request");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, MISSING_KEY_MESSAGE);
    };

    let messages = match parse_messages(&body) {
        Some(messages) => messages,
        None => {
            log::warn!("⚠️ Rejected relay request body: {}", body.chars().take(200).collect::<String>());
            return error_body(StatusCode::BAD_REQUEST, INVALID_BODY_MESSAGE);
        }
    };

    log::debug!("📨 Forwarding {} messages", messages.len());

    match provider.complete(&messages).await {
        Ok(completion) => Json(completion).into_response(),
        Err(e) => relay_error_response(e),
    }
}

fn parse_messages(body: &str) -> Option<Vec<ChatMessage>> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let raw = value.get("messages")?;
    if !raw.is_array() {
        return None;
    }
    let messages: Vec<ChatMessage> = serde_json::from_value(raw.clone()).ok()?;
    (!messages.is_empty()).then_some(messages)
}

fn relay_error_response(err: RelayError) -> Response {
    log::error!("❌ Relay failure: {}", err);
    match err {
        RelayError::Upstream { status, message } => error_body(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        ),
        RelayError::InvalidRequest(_) => error_body(StatusCode::BAD_REQUEST, INVALID_BODY_MESSAGE),
        RelayError::Timeout(_) => error_body(StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out"),
        RelayError::MalformedCompletion(_) => {
            error_body(StatusCode::BAD_GATEWAY, "Upstream returned an invalid response")
        }
        RelayError::Transport(_) => error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
    }
}

/// Parses a JSON body, answering `400 {error}` when it does not fit `T`.
fn parse_body<T: DeserializeOwned>(body: &str, expected: &str) -> Result<T, Response> {
    serde_json::from_str(body).map_err(|e| {
        log::warn!("⚠️ Rejected request body: {}", e);
        error_body(
            StatusCode::BAD_REQUEST,
            format!("Invalid request body. {}", expected),
        )
    })
}

#[derive(Debug, Deserialize)]
struct ScanRequest {
    description: String,
}

async fn scan_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: ScanRequest = match parse_body(&body, "'description' string is required.") {
        Ok(request) => request,
        Err(response) => return response,
    };
    let description = request.description.trim();
    if description.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "'description' must not be empty");
    }

    let outcome = state.scanner.classify_and_analyze(description).await;
    let status = match outcome {
        AnalysisOutcome::Error(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::OK,
    };

    (status, Json(outcome)).into_response()
}

#[derive(Debug, Deserialize)]
struct AssistantRequest {
    #[serde(default)]
    history: Vec<ChatMessage>,
    message: String,
    context: Option<String>,
}

async fn assistant_handler(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: AssistantRequest = match parse_body(&body, "'message' string is required.") {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.message.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "'message' must not be empty");
    }

    let reply = state
        .assistant
        .continue_chat(&request.history, request.message.trim(), request.context.as_deref())
        .await;

    Json(json!({ "message": reply })).into_response()
}

#[derive(Debug, Deserialize)]
struct BmiRequest {
    height_cm: f64,
    weight_kg: f64,
}

async fn bmi_handler(body: String) -> Response {
    let request: BmiRequest =
        match parse_body(&body, "'height_cm' and 'weight_kg' numbers are required.") {
            Ok(request) => request,
            Err(response) => return response,
        };
    match bmi::calculate(request.height_cm, request.weight_kg) {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn root_handler() -> &'static str {
    "Nutriscan relay server - POST /api/chat, /api/scan, /api/assistant, /api/bmi"
}

async fn health_check() -> &'static str {
    "OK"
}
