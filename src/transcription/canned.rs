use super::gateway::{Transcriber, Transcript, TranscriptionContext, TranscriptionError};
use crate::audio::AudioClip;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Phrases returned by [`CannedTranscriber`], in rotation
pub const CANNED_PHRASES: [&str; 5] = [
    "I have experience with React and Node.js",
    "I can implement RESTful APIs and databases",
    "My problem-solving approach is to break down complex tasks",
    "I prefer working in collaborative environments",
    "I have shipped several production applications",
];

/// Offline stand-in for a speech-to-text provider
///
/// Returns fixed phrases in order, for local development without a NATS STT service.
#[derive(Default)]
pub struct CannedTranscriber {
    next: AtomicUsize,
}

impl CannedTranscriber {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transcriber for CannedTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        _context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst) % CANNED_PHRASES.len();
        Ok(Transcript {
            text: CANNED_PHRASES[index].to_string(),
            confidence: None,
            degraded: false,
        })
    }
}
