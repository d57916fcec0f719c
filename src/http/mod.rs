//! HTTP API for interview sessions
//!
//! This module provides a REST API over the session coordinator:
//! - POST /sessions - Start a session (reserves quota)
//! - POST /sessions/:id/audio - Transcribe an audio clip into the transcript
//! - POST /sessions/:id/utterances - Append a caller-numbered utterance
//! - POST /sessions/:id/complete - Complete (commits quota)
//! - POST /sessions/:id/abort - Fail (releases quota)
//! - GET /sessions/:id, GET /sessions/:id/transcript - Session record and transcript
//! - GET /users/:id/quota, GET /users/:id/sessions - Usage and history
//! - PUT /users/:id/subscription, POST /users/:id/subscription/cancel - Subscriptions
//! - GET /plans - Plan catalogue
//! - GET /health - Health check

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{status_for, ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
