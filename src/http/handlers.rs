use super::state::AppState;
use crate::audio::{create_output, AudioBackendFactory};
use crate::session::{SessionStats, TranscriptSegment, VoiceSession};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct StartVoiceRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// Override the configured assistant URL
    pub assistant_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartVoiceResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopVoiceResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn not_running() -> Response {
    error_response(StatusCode::NOT_FOUND, "No voice session is running".to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/start
/// Toggle the voice session on
pub async fn start_voice(
    State(state): State<AppState>,
    Json(req): Json<StartVoiceRequest>,
) -> impl IntoResponse {
    let mut current = state.session.write().await;

    if let Some(session) = current.as_ref() {
        if session.is_active() {
            return error_response(
                StatusCode::CONFLICT,
                format!("Session {} is already running", session.session_id()),
            );
        }
    }

    let template = &state.template;
    let mut config = template.config.clone();
    config.session_id = req
        .session_id
        .unwrap_or_else(|| format!("voice-{}", uuid::Uuid::new_v4()));
    if let Some(url) = req.assistant_url {
        config.assistant_url = url;
    }

    info!("Starting voice session: {}", config.session_id);

    let backend =
        match AudioBackendFactory::create(template.source.clone(), template.backend.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                error!("Failed to create audio input: {:#}", e);
                return error_response(
                    StatusCode::BAD_GATEWAY,
                    format!("Failed to create audio input: {:#}", e),
                );
            }
        };

    let output = match create_output(&template.sink) {
        Ok(output) => output,
        Err(e) => {
            error!("Failed to create audio output: {:#}", e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to create audio output: {:#}", e),
            );
        }
    };

    let session = match VoiceSession::start(config, backend, output).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Failed to start voice session: {:#}", e);
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Failed to start voice session: {:#}", e),
            );
        }
    };

    let session_id = session.session_id().to_string();
    *current = Some(session);

    (
        StatusCode::OK,
        Json(StartVoiceResponse {
            session_id: session_id.clone(),
            status: "listening".to_string(),
            message: format!("Voice session {} started", session_id),
        }),
    )
        .into_response()
}

/// POST /voice/stop
/// Toggle the voice session off
pub async fn stop_voice(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.write().await.take();

    let Some(session) = session else {
        return not_running();
    };

    match session.stop().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StopVoiceResponse {
                session_id: session.session_id().to_string(),
                status: "stopped".to_string(),
                message: "Voice session stopped".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop voice session: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to stop voice session: {:#}", e),
            )
        }
    }
}

/// GET /voice/status
/// Statistics of the current session
pub async fn voice_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => not_running(),
    }
}

/// GET /voice/transcript
/// Transcript accumulated so far
pub async fn voice_transcript(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.read().await.as_ref() {
        Some(session) => {
            let transcript: Vec<TranscriptSegment> = session.transcript();
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => not_running(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Stop whatever session is running (used on shutdown)
pub async fn shutdown_session(state: &AppState) {
    let session: Option<Arc<VoiceSession>> = state.session.write().await.take();
    if let Some(session) = session {
        if let Err(e) = session.stop().await {
            error!("Failed to stop voice session on shutdown: {:#}", e);
        }
    }
}
