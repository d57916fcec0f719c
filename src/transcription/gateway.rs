use crate::audio::AudioClip;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Text placed in the transcript when degraded mode stands in for the provider
pub const DEGRADED_PLACEHOLDER: &str = "[transcription unavailable]";

/// Transcription errors
#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("failed to parse provider reply: {0}")]
    ParseError(String),

    #[error("empty transcription")]
    EmptyResponse,
}

/// Identifies which utterance a transcription request is for
#[derive(Debug, Clone, Copy)]
pub struct TranscriptionContext {
    pub session_id: Uuid,
    pub sequence_no: u64,
}

/// Text produced for one clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: Option<f32>,
    /// Placeholder produced by degraded mode, not by the provider
    pub degraded: bool,
}

/// Speech-to-text provider
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError>;
}

/// Bounded-wait front for a [`Transcriber`]
///
/// Holds no session or quota state; a slow or failing provider can only
/// produce a `TranscriptionError`.
#[derive(Clone)]
pub struct TranscriptionGateway {
    backend: Arc<dyn Transcriber>,
    timeout: Duration,
    degraded_mode: bool,
}

impl TranscriptionGateway {
    pub fn new(backend: Arc<dyn Transcriber>, timeout: Duration, degraded_mode: bool) -> Self {
        Self {
            backend,
            timeout,
            degraded_mode,
        }
    }

    /// One attempt, cut off after the configured timeout
    pub async fn transcribe(
        &self,
        clip: &AudioClip,
        context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError> {
        match tokio::time::timeout(self.timeout, self.backend.transcribe(clip, context)).await {
            Ok(Ok(transcript)) if transcript.text.trim().is_empty() => {
                Err(TranscriptionError::EmptyResponse)
            }
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Transcription for session {} #{} timed out after {:?}",
                    context.session_id, context.sequence_no, self.timeout
                );
                Err(TranscriptionError::Timeout(self.timeout))
            }
        }
    }

    /// Placeholder transcript, available only when degraded mode is enabled
    pub fn degraded(&self) -> Option<Transcript> {
        self.degraded_mode.then(|| Transcript {
            text: DEGRADED_PLACEHOLDER.to_string(),
            confidence: None,
            degraded: true,
        })
    }

    pub fn degraded_mode(&self) -> bool {
        self.degraded_mode
    }
}
