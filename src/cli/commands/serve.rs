//! HTTP API server.
//!
//! `POST /chat` streams an answer as Server-Sent Events; `POST /citations`
//! returns the video references and products for the session's last answer.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::error::JoineryError;
use crate::llm::ChatMessage;
use crate::orchestrator::Orchestrator;
use crate::rag::{CitationPayload, Query, RelevanceLabel, StatsSnapshot};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(Operation::Serve, &settings) {
        Output::error(&e.to_string());
        Output::info("Run 'joinery doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(&settings)?;
    let app = router(orchestrator);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Joinery API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Stats", "GET  /stats");
    Output::kv("Chat (SSE)", "POST /chat");
    Output::kv("Citations", "POST /citations");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    info!("Serving on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/chat", post(chat))
        .route("/citations", post(citations))
        .layer(cors)
        .with_state(state)
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    messages: Vec<ChatMessage>,
}

/// First SSE event of a chat response.
#[derive(Serialize)]
struct MetaEvent {
    session_id: String,
    label: RelevanceLabel,
    rewritten_query: Option<String>,
    sources: usize,
}

#[derive(Deserialize)]
struct CitationRequest {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Serialize)]
struct StatsResponse {
    pipeline: StatsSnapshot,
    pending_sessions: usize,
}

// === Handlers ===

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.orchestrator.indexed_chunks().await {
        Ok(count) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "indexed_chunks": count })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable", "error": e.to_payload(None) })),
        ),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        pipeline: state.orchestrator.stats(),
        pending_sessions: state.orchestrator.pending_sessions(),
    })
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> Response {
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Some(query) = Query::from_messages(req.messages) else {
        let error = JoineryError::InvalidInput("No user message in request".to_string());
        return (StatusCode::BAD_REQUEST, Json(error.to_payload(None))).into_response();
    };

    let response = match state.orchestrator.respond(&session_id, &query).await {
        Ok(response) => response,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(e.to_payload())).into_response();
        }
    };

    let meta = MetaEvent {
        session_id,
        label: response.label,
        rewritten_query: response.search_query,
        sources: response.sources.len(),
    };
    let meta = Event::default()
        .event("meta")
        .data(serde_json::to_string(&meta).unwrap_or_default());

    let events = stream::once(async move { Ok::<_, Infallible>(meta) }).chain(
        response
            .events
            .map(|event| Ok(Event::default().event(event.name()).data(event.data()))),
    );

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Always answers 200; anything that cannot name a session gets the empty payload.
async fn citations(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CitationRequest>, JsonRejection>,
) -> Json<CitationPayload> {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Unreadable citation request: {}", rejection.body_text());
            return Json(CitationPayload::empty());
        }
    };

    let Some(session_id) = req.session_id.filter(|s| !s.trim().is_empty()) else {
        warn!("Citation request without a session id");
        return Json(CitationPayload::empty());
    };

    Json(
        state
            .orchestrator
            .request_citations(&session_id, req.answer.as_deref())
            .await,
    )
}
