//! HTTP surface for the session orchestrator
//!
//! Exposes session creation, question submission, full-session reads,
//! per-turn structured process reads, an SSE stream of live turn events, and
//! the merged history list. Every SSE frame is one JSON event; the stream of
//! a turn ends with a `turn_finished` event.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::error::Error;
use crate::session::{AgentKind, SessionManager, SessionOptions};

/// Shared handler state
#[derive(Clone)]
struct AppState {
    manager: Arc<SessionManager>,
}

/// Build the API router.
pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/api/session", post(create_session))
        .route("/api/research", post(submit_research))
        .route("/api/session/{session_id}", get(fetch_session))
        .route(
            "/api/session/{session_id}/turn/{turn_index}/process",
            get(fetch_turn_process),
        )
        .route(
            "/api/session/{session_id}/task/{task_id}/process",
            get(fetch_task_process),
        )
        .route("/api/session/{session_id}/stream", get(stream_session))
        .route("/api/history", get(list_history))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(AppState { manager })
}

// ---- Error handling ----

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Session(_) => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

fn session_not_found() -> AppError {
    AppError(Error::NotFound("Session not found".to_string()))
}

// ---- Request types ----

#[derive(Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    tts_num_agents: Option<usize>,
    #[serde(default)]
    max_turns: Option<usize>,
    #[serde(default)]
    instruction: Option<String>,
    #[serde(default)]
    tools: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ResearchRequest {
    session_id: String,
    question: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

// ---- Handlers ----

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let agent: AgentKind = request.agent.as_deref().unwrap_or("").parse()?;
    let options = SessionOptions {
        agent,
        num_samples: request.tts_num_agents.unwrap_or(3).clamp(2, 8),
        max_history_turns: request.max_turns.unwrap_or(5).clamp(1, 20),
        instruction: request.instruction.unwrap_or_default(),
        tools: request.tools,
    };
    let session = state.manager.create_session(options);
    Ok(Json(session.summary()))
}

async fn submit_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.question.trim().is_empty() {
        return Err(AppError(Error::InvalidInput(
            "question must not be empty".to_string(),
        )));
    }
    let session = state
        .manager
        .get_session(&request.session_id)
        .await
        .ok_or_else(session_not_found)?;
    state
        .manager
        .clone()
        .start_research(session.clone(), request.question)?;
    Ok(Json(json!({ "session_id": session.id, "status": "running" })))
}

async fn fetch_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .manager
        .get_session(&session_id)
        .await
        .ok_or_else(session_not_found)?;
    Ok(Json(session.to_record()))
}

async fn fetch_turn_process(
    State(state): State<AppState>,
    Path((session_id, turn_index)): Path<(String, usize)>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .manager
        .get_session(&session_id)
        .await
        .ok_or_else(session_not_found)?;
    let process = session
        .turn_process(turn_index)
        .ok_or_else(|| AppError(Error::NotFound("Turn not found".to_string())))?;
    Ok(Json(process))
}

async fn fetch_task_process(
    State(state): State<AppState>,
    Path((session_id, task_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .manager
        .get_session(&session_id)
        .await
        .ok_or_else(session_not_found)?;
    let process = session
        .task_process(&task_id)
        .ok_or_else(|| AppError(Error::NotFound("Task not found".to_string())))?;
    Ok(Json(process))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, AppError> {
    let session = state
        .manager
        .get_session(&session_id)
        .await
        .ok_or_else(session_not_found)?;

    let stream = async_stream::stream! {
        // Historical sessions carry no live turn and stream nothing.
        if !session.has_current_turn() {
            let info = json!({"type": "info", "message": "Historical session, no live events"});
            yield Ok(Event::default().data(info.to_string()));
            return;
        }

        let mut sent = 0usize;
        loop {
            // Register for wakeups before snapshotting so no event between
            // snapshot and await is lost.
            let notified = session.notified();

            let Some((fresh, turn_index, status, answer, error, last_report)) =
                session.stream_snapshot(sent)
            else {
                break;
            };

            for mut event in fresh {
                if let Some(obj) = event.as_object_mut() {
                    obj.insert("turn_index".to_string(), json!(turn_index));
                }
                sent += 1;
                yield Ok(Event::default().data(event.to_string()));
            }

            if status.is_finished() {
                let finished = json!({
                    "type": "turn_finished",
                    "turn_index": turn_index,
                    "status": status,
                    "answer": answer,
                    "report": last_report,
                    "error": error,
                });
                yield Ok(Event::default().data(finished.to_string()));
                break;
            }

            notified.await;
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let records = state.manager.read_history(query.limit.unwrap_or(20)).await;
    Ok(Json(json!({ "items": records })))
}
