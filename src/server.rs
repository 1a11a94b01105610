use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::{AppConfig, SessionsConfig};
use crate::error::{DialogError, require_text};
use crate::llm::{Message, OllamaDriver};
use crate::resilience::{rate_limit_middleware, request_timeout, timeout_middleware};
use crate::session::{DialogSession, DialogState, LogKind, SessionStore};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let settings = config.llm_settings();
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let driver = OllamaDriver::new(settings).context("failed to build model driver")?;
    let state = AppState::new(Arc::clone(&config), Arc::new(driver));

    spawn_session_reaper(state.sessions.clone(), &config.sessions);

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router with all middleware applied.
pub fn build_router(state: AppState) -> Router {
    let timeout_duration = request_timeout(&state.config.resilience);

    Router::new()
        .route("/SingleDialogExchange", post(single_dialog_exchange))
        .route("/generate", post(generate))
        .route("/MultiDialogExchange", post(multi_dialog_exchange))
        .route("/history", get(default_history))
        .route("/history/transcript", get(default_transcript))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", axum::routing::delete(delete_session))
        .route("/sessions/{id}/ask", post(session_ask))
        .route("/sessions/{id}/history", get(session_history))
        .route("/sessions/{id}/transcript", get(session_transcript))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB limit
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| timeout_middleware(timeout_duration, req, next),
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

/// Periodically drop sessions that have been idle too long.
fn spawn_session_reaper(sessions: SessionStore, config: &SessionsConfig) {
    let idle = Duration::from_secs(config.idle_timeout_secs);
    let every = Duration::from_secs(config.cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle);
            if removed > 0 {
                info!(
                    name: "sessions.reaped",
                    removed,
                    remaining = sessions.len(),
                    "Expired sessions removed"
                );
            }
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body carrying a user question.
#[derive(Debug, Deserialize)]
struct QuestionRequest {
    #[serde(default)]
    question: Option<String>,
    /// Target session for `/MultiDialogExchange` (the default session if
    /// absent). Must match the path on `/sessions/{id}/ask` and is refused by
    /// single-turn exchanges.
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    answer: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    text: String,
}

/// Request body for session creation.
#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    /// Seed system prompt; the configured default is used when absent.
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

/// Session overview for listings.
#[derive(Debug, Serialize)]
struct SessionSummary {
    id: String,
    state: DialogState,
    input_log_len: usize,
    transcript_len: usize,
    age_secs: u64,
}

impl From<&DialogSession> for SessionSummary {
    fn from(session: &DialogSession) -> Self {
        Self {
            id: session.id().to_string(),
            state: session.state(),
            input_log_len: session.log_len(LogKind::Input),
            transcript_len: session.log_len(LogKind::Transcript),
            age_secs: session.age().as_secs(),
        }
    }
}

/// Query for history reads: `?log=inputLog` (default) or `?log=fullTranscript`.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    log: LogKind,
}

/// Unwrap a JSON body. Any rejection (no body, wrong content type, bad
/// shape) is reported as a validation error carrying `message`.
fn json_body<T>(body: Result<Json<T>, JsonRejection>, message: &str) -> Result<T, DialogError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected request body");
            Err(DialogError::Validation(message.to_string()))
        }
    }
}

/// POST /SingleDialogExchange - Stateless question with the instruction prefix.
async fn single_dialog_exchange(
    State(state): State<AppState>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, DialogError> {
    let req = json_body(body, "Question is required")?;
    if req.session_id.is_some() {
        return Err(DialogError::Validation(
            "session_id is not accepted by single-turn exchanges".to_string(),
        ));
    }
    let answer = state.orchestrator.ask_once(req.question.as_deref()).await?;
    Ok(Json(AnswerResponse { answer }))
}

/// POST /generate - Raw completion.
async fn generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, DialogError> {
    let req = json_body(body, "Prompt is required")?;
    let text = state
        .orchestrator
        .generate_completion(req.prompt.as_deref())
        .await?;
    Ok(Json(GenerateResponse { text }))
}

/// POST /MultiDialogExchange - One turn on the default (or given) session.
async fn multi_dialog_exchange(
    State(state): State<AppState>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, DialogError> {
    let req = json_body(body, "Question is required")?;
    let session = match req.session_id.as_deref() {
        Some(id) => state.sessions.require(id)?,
        None => state.sessions.default_session(),
    };
    ask_in(&state, &session, req.question.as_deref()).await
}

/// POST /sessions/:id/ask - One turn on a specific session.
async fn session_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, DialogError> {
    let req = json_body(body, "Question is required")?;
    if let Some(body_id) = req.session_id.as_deref().filter(|body_id| *body_id != id) {
        return Err(DialogError::Validation(format!(
            "session_id {body_id} does not match session {id} in the path"
        )));
    }
    let session = state.sessions.require(&id)?;
    ask_in(&state, &session, req.question.as_deref()).await
}

async fn ask_in(
    state: &AppState,
    session: &DialogSession,
    question: Option<&str>,
) -> Result<Json<AnswerResponse>, DialogError> {
    tracing::info!(session_id = %session.id(), "Received dialog turn");
    let answer = session.ask(&state.orchestrator, question).await?;
    Ok(Json(AnswerResponse { answer }))
}

/// GET /history - Default session log.
async fn default_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<Message>> {
    Json(state.sessions.default_session().log(query.log))
}

/// GET /history/transcript - Default session full transcript.
async fn default_transcript(State(state): State<AppState>) -> Json<Vec<Message>> {
    Json(state.sessions.default_session().log(LogKind::Transcript))
}

/// GET /sessions - List sessions.
async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let summaries = state
        .sessions
        .list_ids()
        .iter()
        .filter_map(|id| state.sessions.get(id))
        .map(|session| SessionSummary::from(&session))
        .collect();
    Json(summaries)
}

/// POST /sessions - Create a session. A request without a JSON body creates
/// a session seeded with the configured system prompt.
async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), DialogError> {
    let req = match body {
        Err(JsonRejection::MissingJsonContentType(_)) => CreateSessionRequest::default(),
        other => json_body(other, "Invalid session request body")?,
    };
    let seed = match req.system_prompt.as_deref() {
        Some(prompt) => Some(Message::system(require_text(
            Some(prompt),
            "System prompt cannot be empty",
        )?)),
        None => None,
    };

    let session = state.sessions.create(seed);
    tracing::info!(session_id = %session.id(), "Created session");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id().to_string(),
        }),
    ))
}

/// DELETE /sessions/:id - Remove a session.
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, DialogError> {
    state.sessions.remove(&id)?;
    tracing::info!(session_id = %id, "Deleted session");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sessions/:id/history - Session log (model-input by default).
async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, DialogError> {
    Ok(Json(state.sessions.require(&id)?.log(query.log)))
}

/// GET /sessions/:id/transcript - Session full transcript.
async fn session_transcript(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, DialogError> {
    Ok(Json(state.sessions.require(&id)?.log(LogKind::Transcript)))
}
