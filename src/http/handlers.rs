use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::audio::AudioClip;
use crate::billing::{Plan, Subscription};
use crate::coordinator::{NewUtterance, QuotaStatus};
use crate::session::{InterviewSession, SessionState, SessionSummary, Utterance};
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: String,

    /// Job posting the interview is for
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioQuery {
    /// Accept a placeholder transcript if the provider is down
    #[serde(default)]
    pub best_effort: bool,
}

#[derive(Debug, Serialize)]
pub struct AudioResponse {
    pub text: String,
    pub sequence_no: u64,
    pub degraded: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AbortRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AbortResponse {
    pub status: SessionState,
}

#[derive(Debug, Deserialize)]
pub struct ActivateSubscriptionRequest {
    pub plan_id: String,

    /// Billing period length (default: 30 days)
    pub period_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CancelSubscriptionResponse {
    pub cancelled: bool,
    pub subscription: Option<Subscription>,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<Plan>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Start a new interview session if the user has quota left
pub async fn start_session(
    State(state): State<AppState>,
    req: Result<Json<StartSessionRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let session_id = state
        .coordinator
        .start_session(&req.user_id, req.job_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse { session_id }),
    ))
}

/// POST /sessions/:session_id/audio
/// Transcribe an uploaded clip (multipart field "audio") into the transcript
pub async fn submit_audio(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<AudioQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<AudioResponse>> {
    let Path(session_id) = session_id?;
    let Query(query) = query?;
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read audio field: {}", e)))?;
        upload = Some((bytes.to_vec(), content_type));
        break;
    }

    let Some((bytes, content_type)) = upload else {
        return Err(ApiError::BadRequest("No audio file provided".to_string()));
    };

    info!(
        "Received {} bytes of audio for session {}",
        bytes.len(),
        session_id
    );

    let clip = AudioClip::from_bytes(bytes, content_type, state.max_audio_bytes)
        .map_err(crate::error::CoordinatorError::from)?;

    let utterance = state
        .coordinator
        .submit_audio(session_id, clip, query.best_effort)
        .await?;

    Ok(Json(AudioResponse {
        text: utterance.text,
        sequence_no: utterance.sequence_no,
        degraded: utterance.degraded,
    }))
}

/// POST /sessions/:session_id/utterances
/// Record a caller-numbered utterance (interviewer prompts, captured conversation)
pub async fn append_utterance(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
    req: Result<Json<NewUtterance>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(session_id) = session_id?;
    let Json(req) = req?;
    let utterance = state.coordinator.append_utterance(session_id, req).await?;
    Ok((StatusCode::CREATED, Json(utterance)))
}

/// POST /sessions/:session_id/complete
/// Complete the session and consume one unit of quota
pub async fn complete_session(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<SessionSummary>> {
    let Path(session_id) = session_id?;
    let summary = state.coordinator.finish_session(session_id).await?;
    Ok(Json(summary))
}

/// POST /sessions/:session_id/abort
/// Fail the session and hand its quota back
pub async fn abort_session(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
    body: Option<Json<AbortRequest>>,
) -> ApiResult<Json<AbortResponse>> {
    let Path(session_id) = session_id?;
    let reason = body
        .and_then(|Json(req)| req.reason)
        .unwrap_or_else(|| "aborted by client".to_string());

    let status = state
        .coordinator
        .abort_session(session_id, &reason)
        .await?;

    Ok(Json(AbortResponse { status }))
}

/// GET /sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<InterviewSession>> {
    let Path(session_id) = session_id?;
    Ok(Json(state.coordinator.get_session(session_id).await?))
}

/// GET /sessions/:session_id/transcript
/// Utterances in sequence order
pub async fn get_transcript(
    State(state): State<AppState>,
    session_id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Vec<Utterance>>> {
    let Path(session_id) = session_id?;
    let session = state.coordinator.get_session(session_id).await?;
    Ok(Json(session.transcript))
}

/// GET /users/:user_id/sessions
pub async fn list_user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<InterviewSession>>> {
    Ok(Json(state.coordinator.list_user_sessions(&user_id).await?))
}

/// GET /users/:user_id/quota
/// Remaining interviews in the current billing period
pub async fn get_quota(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<QuotaStatus>> {
    Ok(Json(state.coordinator.quota_status(&user_id).await?))
}

/// PUT /users/:user_id/subscription
/// Record a purchased plan, replacing the active one
pub async fn activate_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    req: Result<Json<ActivateSubscriptionRequest>, JsonRejection>,
) -> ApiResult<Json<Subscription>> {
    let Json(req) = req?;
    let period_days = req.period_days.unwrap_or(30);
    if period_days <= 0 {
        return Err(ApiError::BadRequest(
            "period_days must be positive".to_string(),
        ));
    }

    let subscription = state
        .coordinator
        .activate_subscription(&user_id, &req.plan_id, chrono::Duration::days(period_days))
        .await?;
    Ok(Json(subscription))
}

/// POST /users/:user_id/subscription/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<CancelSubscriptionResponse>> {
    let subscription = state.coordinator.cancel_subscription(&user_id).await?;
    Ok(Json(CancelSubscriptionResponse {
        cancelled: subscription.is_some(),
        subscription,
    }))
}

/// GET /plans
/// Plan catalogue, cheapest first
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<PlansResponse>> {
    let plans = state.coordinator.plans().await?;
    Ok(Json(PlansResponse { plans }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
