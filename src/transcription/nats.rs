use super::gateway::{Transcriber, Transcript, TranscriptionContext, TranscriptionError};
use super::messages::{TranscriptionReply, TranscriptionRequest};
use crate::audio::AudioClip;
use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, info};

/// Speech-to-text over NATS request/reply
pub struct NatsTranscriber {
    client: Client,
    subject: String,
}

impl NatsTranscriber {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject: subject.into(),
        })
    }

    fn encode_request(
        clip: &AudioClip,
        context: TranscriptionContext,
    ) -> Result<Vec<u8>, TranscriptionError> {
        let message = TranscriptionRequest {
            session_id: context.session_id.to_string(),
            sequence: context.sequence_no,
            audio: base64::engine::general_purpose::STANDARD.encode(&clip.bytes),
            content_type: clip.content_type.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        serde_json::to_vec(&message).map_err(|e| TranscriptionError::RequestFailed(e.to_string()))
    }
}

/// Turn a raw NATS reply payload into a transcript
pub fn decode_reply(payload: &[u8]) -> Result<Transcript, TranscriptionError> {
    let reply: TranscriptionReply = serde_json::from_slice(payload)
        .map_err(|e| TranscriptionError::ParseError(e.to_string()))?;

    if let Some(error) = reply.error {
        return Err(TranscriptionError::Provider(error));
    }

    Ok(Transcript {
        text: reply.text,
        confidence: reply.confidence,
        degraded: false,
    })
}

#[async_trait]
impl Transcriber for NatsTranscriber {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError> {
        let payload = Self::encode_request(clip, context)?;

        debug!(
            "Requesting transcription on {} (session={}, seq={}, bytes={})",
            self.subject,
            context.session_id,
            context.sequence_no,
            clip.bytes.len()
        );

        let reply = self
            .client
            .request(self.subject.clone(), payload.into())
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        decode_reply(&reply.payload)
    }
}
