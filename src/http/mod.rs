//! HTTP API server for external control (web or desktop front end)
//!
//! This module provides a REST API for driving coaching sessions:
//! - POST /sessions - Create (and connect) a session
//! - POST /sessions/:id/{open,connect,pause,resume,reset-recognition,disconnect}
//! - GET /sessions/:id/{status,conversation,transcript,feedback}
//! - POST /sessions/:id/feedback - Generate feedback now
//! - GET /coaching-options - Coaching option and expert catalog
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
