use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the audio payload itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_audio_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::start_session))
        .route("/sessions/:session_id", get(handlers::get_session))
        .route("/sessions/:session_id/audio", post(handlers::submit_audio))
        .route(
            "/sessions/:session_id/utterances",
            post(handlers::append_utterance),
        )
        .route(
            "/sessions/:session_id/transcript",
            get(handlers::get_transcript),
        )
        .route(
            "/sessions/:session_id/complete",
            post(handlers::complete_session),
        )
        .route("/sessions/:session_id/abort", post(handlers::abort_session))
        // Users, plans and subscriptions
        .route("/plans", get(handlers::list_plans))
        .route("/users/:user_id/quota", get(handlers::get_quota))
        .route("/users/:user_id/sessions", get(handlers::list_user_sessions))
        .route(
            "/users/:user_id/subscription",
            put(handlers::activate_subscription),
        )
        .route(
            "/users/:user_id/subscription/cancel",
            post(handlers::cancel_subscription),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        // Request logging outermost, then CORS
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
