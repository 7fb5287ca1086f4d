use super::state::AppState;
use crate::coaching::{CoachingOption, Expert};
use crate::conversation::{sanitize, Message};
use crate::session::{CoachingSession, NewSession, SessionError, SessionState};
use crate::store::StoreError;
use crate::summary::SummaryGenerator;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(flatten)]
    pub session: NewSession,

    /// Connect right away (default: true)
    #[serde(default)]
    pub connect: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse<'a> {
    pub options: &'a [CoachingOption],
    pub experts: &'a [Expert],
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn not_found(session_id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        format!("Session {} not found", session_id),
    )
}

fn session_error(err: SessionError) -> Response {
    let status = match &err {
        SessionError::InvalidState { .. } => StatusCode::CONFLICT,
        SessionError::UnknownCoachingOption(_) => StatusCode::BAD_REQUEST,
        SessionError::Microphone(_)
        | SessionError::RecognitionUnsupported
        | SessionError::Recognition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Store(StoreError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Closed => StatusCode::GONE,
    };
    if status.is_server_error() {
        error!("Session request failed: {}", err);
    } else {
        warn!("Session request rejected: {}", err);
    }
    error_response(status, err.to_string())
}

fn session_ok(session: &CoachingSession) -> Response {
    (
        StatusCode::OK,
        Json(SessionResponse {
            session_id: session.id().to_string(),
            state: session.state(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /coaching-options
pub async fn list_coaching_options(State(state): State<AppState>) -> Response {
    let catalog = &state.services.catalog;
    (
        StatusCode::OK,
        Json(CatalogResponse {
            options: catalog.options(),
            experts: catalog.experts(),
        }),
    )
        .into_response()
}

/// POST /sessions
/// Create a session and (by default) connect it
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    info!(
        "Creating {} session on {:?}",
        req.session.coaching_option, req.session.topic
    );

    let session = match CoachingSession::create(state.services.clone(), req.session).await {
        Ok(session) => session,
        Err(e) => return session_error(e),
    };
    state
        .sessions
        .write()
        .await
        .insert(session.id().to_string(), session.clone());

    if req.connect.unwrap_or(true) {
        if let Err(e) = session.connect().await {
            // Session stays registered in the error state so it can be retried
            return session_error(e);
        }
    }

    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id: session.id().to_string(),
            state: session.state(),
        }),
    )
        .into_response()
}

/// POST /sessions/:session_id/open
/// Load a persisted session (hydrating its conversation) and connect it
pub async fn open_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(existing) = state.session(&session_id).await {
        return session_ok(&existing);
    }

    let session = match CoachingSession::open(state.services.clone(), &session_id).await {
        Ok(session) => session,
        Err(e) => return session_error(e),
    };
    state
        .sessions
        .write()
        .await
        .insert(session_id.clone(), session.clone());

    match session.connect().await {
        Ok(()) => session_ok(&session),
        Err(e) => session_error(e),
    }
}

/// POST /sessions/:session_id/connect
pub async fn connect_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.connect().await {
        Ok(()) => session_ok(&session),
        Err(e) => session_error(e),
    }
}

/// POST /sessions/:session_id/pause
pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.pause().await {
        Ok(()) => session_ok(&session),
        Err(e) => session_error(e),
    }
}

/// POST /sessions/:session_id/resume
pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.resume().await {
        Ok(()) => session_ok(&session),
        Err(e) => session_error(e),
    }
}

/// POST /sessions/:session_id/reset-recognition
pub async fn reset_recognition(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.reset_recognition().await {
        Ok(()) => session_ok(&session),
        Err(e) => session_error(e),
    }
}

/// POST /sessions/:session_id/disconnect
/// End the session and drop it from the live set
pub async fn disconnect_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session = state.sessions.write().await.remove(&session_id);
    let Some(session) = session else {
        return not_found(&session_id);
    };

    match session.disconnect().await {
        Ok(report) => {
            info!("Session {} disconnected", session_id);
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => session_error(e),
    }
}

/// GET /sessions/:session_id/status
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /sessions/:session_id/conversation
/// Live conversation, or the persisted one for ended sessions
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(session) = state.session(&session_id).await {
        return match session.conversation().await {
            Ok(messages) => (StatusCode::OK, Json(messages)).into_response(),
            Err(e) => session_error(e),
        };
    }

    match state.services.store.get_session(&session_id).await {
        Ok(record) => {
            let messages: Vec<Message> =
                record.conversation.as_ref().map(sanitize).unwrap_or_default();
            (StatusCode::OK, Json(messages)).into_response()
        }
        Err(e) => session_error(e.into()),
    }
}

/// GET /sessions/:session_id/transcript
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.session(&session_id).await else {
        return not_found(&session_id);
    };
    match session.transcript().await {
        Ok(transcript) => (StatusCode::OK, Json(transcript)).into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /sessions/:session_id/feedback
pub async fn get_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.services.store.get_session(&session_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(FeedbackResponse {
                feedback: record.session_feedback,
            }),
        )
            .into_response(),
        Err(e) => session_error(e.into()),
    }
}

/// POST /sessions/:session_id/feedback
/// Generate feedback now
pub async fn generate_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(session) = state.session(&session_id).await {
        return match session.generate_feedback().await {
            Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
            Err(e) => session_error(e),
        };
    }

    let record = match state.services.store.get_session(&session_id).await {
        Ok(record) => record,
        Err(e) => return session_error(e.into()),
    };
    let Some(option) = state.services.catalog.option(&record.coaching_option) else {
        return session_error(SessionError::UnknownCoachingOption(record.coaching_option));
    };

    let generator = SummaryGenerator::new(
        state.services.pipeline.clone(),
        state.services.store.clone(),
    );
    let outcome = generator.generate(&session_id, &record.topic, option, &[]).await;
    (StatusCode::OK, Json(outcome)).into_response()
}
