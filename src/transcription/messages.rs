use serde::{Deserialize, Serialize};

/// Transcription request published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub session_id: String,
    pub sequence: u64,
    pub audio: String, // Base64-encoded audio bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub timestamp: String, // RFC3339 timestamp
}

/// Reply from the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Set by the service when it could not transcribe the clip
    #[serde(default)]
    pub error: Option<String>,
}
