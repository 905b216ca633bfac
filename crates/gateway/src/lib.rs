//! HTTP gateway for Falcon.
//!
//! Exposes the assistant to a front-end:
//!
//! - `POST /api/query`   - Answer a user query
//! - `POST /api/speak`   - Speak text aloud
//! - `POST /api/stop`    - Interrupt speech (barge-in)
//! - `GET  /api/status`  - Readiness, speech state, server time
//! - `GET  /api/history` - Recent completed turns
//! - `GET  /api/search`  - Conversation search by keyword
//! - `GET  /api/export`  - Full history as CSV or JSON
//! - `GET  /api/events`  - SSE stream of domain events
//! - `GET  /health`
//!
//! Built on Axum.

pub mod assistant;
pub mod bootstrap;
pub mod export;

#[cfg(test)]
mod test_support;

pub use assistant::{Assistant, ExportData, ExportError, QueryReply, SystemStatus};
pub use bootstrap::{build_assistant, build_assistant_with};

use axum::{
    Router,
    extract::{Query, State},
    http::{Method, StatusCode, header},
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use falcon_core::memory::TurnMatch;
use falcon_core::message::Message;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

type SharedState = Arc<Assistant>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/query", post(query_handler))
        .route("/api/speak", post(speak_handler))
        .route("/api/stop", post(stop_handler))
        .route("/api/status", get(status_handler))
        .route("/api/history", get(history_handler))
        .route("/api/search", get(search_handler))
        .route("/api/export", get(export_handler))
        .route("/api/events", get(events_handler))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server. Runs until Ctrl-C, then stops speech.
pub async fn start(config: falcon_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let assistant = Arc::new(build_assistant(&config).await);
    if !assistant.is_ready() {
        warn!("Assistant not initialized, queries will be refused until restart");
    }

    let app = build_router(assistant.clone());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for shutdown signal");
            }
        })
        .await?;

    assistant.shutdown().await;
    info!("Gateway stopped");
    Ok(())
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

#[derive(Deserialize)]
struct TextRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SuccessResponse {
    success: bool,
}

async fn query_handler(
    State(state): State<SharedState>,
    Json(payload): Json<TextRequest>,
) -> Json<QueryReply> {
    info!(text_len = payload.text.len(), "Query received");
    Json(state.process_user_query(&payload.text).await)
}

async fn speak_handler(
    State(state): State<SharedState>,
    Json(payload): Json<TextRequest>,
) -> Json<SuccessResponse> {
    Json(SuccessResponse {
        success: state.request_speech(&payload.text).await,
    })
}

async fn stop_handler(State(state): State<SharedState>) -> Json<SuccessResponse> {
    Json(SuccessResponse {
        success: state.stop_speech(),
    })
}

async fn status_handler(State(state): State<SharedState>) -> Json<SystemStatus> {
    Json(state.status())
}

async fn history_handler(State(state): State<SharedState>) -> Json<Vec<Message>> {
    Json(state.history().await)
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    keyword: String,
}

async fn search_handler(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<TurnMatch>> {
    Json(state.search_conversations(&params.keyword).await)
}

#[derive(Deserialize)]
struct ExportParams {
    format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

async fn export_handler(
    State(state): State<SharedState>,
    Query(params): Query<ExportParams>,
) -> Result<Json<ExportData>, (StatusCode, Json<ErrorResponse>)> {
    let format = params.format.as_deref().unwrap_or("csv");
    state.export_history(format).await.map(Json).map_err(|e| {
        let status = match e {
            ExportError::UnknownFormat(_) => StatusCode::BAD_REQUEST,
            ExportError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ExportError::Storage(_) | ExportError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!(error = %e, "History export failed");
        (status, Json(ErrorResponse { error: e.to_string() }))
    })
}

/// `GET /api/events`: SSE stream of domain events (speech status, tool runs, turns).
async fn events_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.events().subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.kind()).data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
