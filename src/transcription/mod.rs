//! Transcription gateway
//!
//! `TranscriptionGateway` bounds every provider call with a timeout and can
//! stand in a placeholder when degraded mode is enabled. Providers:
//! - `NatsTranscriber` - request/reply to the STT service over NATS
//! - `CannedTranscriber` - fixed phrases for offline development

mod canned;
mod gateway;
pub mod messages;
mod nats;

pub use canned::{CannedTranscriber, CANNED_PHRASES};
pub use gateway::{
    Transcriber, Transcript, TranscriptionContext, TranscriptionError, TranscriptionGateway,
    DEGRADED_PLACEHOLDER,
};
pub use messages::{TranscriptionReply, TranscriptionRequest};
pub use nats::{decode_reply, NatsTranscriber};
