//! Error taxonomy shared by the ledger, the session state machine and the coordinator.
//!
//! Every error that leaves the coordinator carries a stable [`ErrorKind`] tag so
//! callers can tell retryable conditions from terminal ones without parsing text.

use crate::audio::AudioError;
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable, serialisable tag for a [`CoordinatorError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    QuotaExceeded,
    SubscriptionInactive,
    TranscriptionUnavailable,
    OutOfOrderUtterance,
    #[serde(rename = "invalid_state")]
    InvalidSessionState,
    SessionNotFound,
    UnknownPlan,
    InvalidAudio,
    StorageUnavailable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::SubscriptionInactive => "subscription_inactive",
            Self::TranscriptionUnavailable => "transcription_unavailable",
            Self::OutOfOrderUtterance => "out_of_order_utterance",
            Self::InvalidSessionState => "invalid_state",
            Self::SessionNotFound => "session_not_found",
            Self::UnknownPlan => "unknown_plan",
            Self::InvalidAudio => "invalid_audio",
            Self::StorageUnavailable => "storage_unavailable",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the backing store (ledger counters, sessions, subscriptions)
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("conditional write lost {attempts} times in a row")]
    Contention { attempts: u32 },

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Errors surfaced by [`crate::SessionCoordinator`] operations
#[derive(Debug, Clone, Error)]
pub enum CoordinatorError {
    #[error("interview quota exhausted for user {user_id} ({limit} per period)")]
    QuotaExceeded { user_id: String, limit: u32 },

    #[error("user {user_id} has no active subscription")]
    SubscriptionInactive { user_id: String },

    #[error("transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("utterance {got} rejected, sequence must exceed {last}")]
    OutOfOrderUtterance { last: u64, got: u64 },

    #[error("session {session_id} cannot do that while {state}")]
    InvalidSessionState { session_id: Uuid, state: SessionState },

    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    #[error("plan {0} does not exist")]
    UnknownPlan(String),

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            Self::SubscriptionInactive { .. } => ErrorKind::SubscriptionInactive,
            Self::TranscriptionUnavailable(_) => ErrorKind::TranscriptionUnavailable,
            Self::OutOfOrderUtterance { .. } => ErrorKind::OutOfOrderUtterance,
            Self::InvalidSessionState { .. } => ErrorKind::InvalidSessionState,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::UnknownPlan(_) => ErrorKind::UnknownPlan,
            Self::InvalidAudio(_) => ErrorKind::InvalidAudio,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
        }
    }

    /// Whether the caller may retry the whole operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TranscriptionUnavailable | ErrorKind::StorageUnavailable
        )
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        CoordinatorError::StorageUnavailable(e.to_string())
    }
}

impl From<AudioError> for CoordinatorError {
    fn from(e: AudioError) -> Self {
        CoordinatorError::InvalidAudio(e.to_string())
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
