use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The candidate being interviewed (transcribed audio)
    Candidate,
    /// The interviewer side (AI prompts, system messages)
    System,
}

/// A single entry in a session transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    /// Position in the transcript; strictly increasing within a session
    pub sequence_no: u64,

    pub source: Speaker,

    pub text: String,

    /// When this utterance was recorded
    pub timestamp: DateTime<Utc>,

    /// Length of the source audio, if it came from an upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_seconds: Option<f64>,

    /// Placeholder text produced while transcription was unavailable
    #[serde(default)]
    pub degraded: bool,
}

/// Final (or current) figures for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,

    pub state: SessionState,

    /// Wall-clock seconds from creation to the terminal transition (or now)
    pub duration_seconds: f64,

    pub utterance_count: usize,

    /// Sum of the uploaded audio lengths
    pub audio_seconds: f64,
}
