//! Interview session management
//!
//! This module provides the `InterviewSession` state machine:
//! - Lifecycle `Pending -> InProgress -> Completed | Failed | Abandoned`
//! - Transcript of strictly ordered utterances
//! - Idle detection for the abandonment sweep
//! - Versioned storage through `SessionRepository`

mod config;
mod repository;
mod session;
mod state;
mod stats;

pub use config::SessionPolicy;
pub use repository::{MemorySessionRepository, SessionRepository};
pub use session::{Completion, InterviewSession};
pub use state::SessionState;
pub use stats::{SessionSummary, Speaker, Utterance};
