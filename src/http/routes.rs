use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Catalog
        .route("/coaching-options", get(handlers::list_coaching_options))
        // Session lifecycle
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:session_id/open", post(handlers::open_session))
        .route("/sessions/:session_id/connect", post(handlers::connect_session))
        .route("/sessions/:session_id/pause", post(handlers::pause_session))
        .route("/sessions/:session_id/resume", post(handlers::resume_session))
        .route(
            "/sessions/:session_id/reset-recognition",
            post(handlers::reset_recognition),
        )
        .route(
            "/sessions/:session_id/disconnect",
            post(handlers::disconnect_session),
        )
        // Session queries
        .route("/sessions/:session_id/status", get(handlers::get_session_status))
        .route(
            "/sessions/:session_id/conversation",
            get(handlers::get_conversation),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_transcript),
        )
        .route(
            "/sessions/:session_id/feedback",
            get(handlers::get_feedback).post(handlers::generate_feedback),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
