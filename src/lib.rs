pub mod audio;
pub mod billing;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod ledger;
pub mod session;
pub mod transcription;

pub use audio::{AudioClip, AudioError};
pub use billing::{
    MemorySubscriptionDirectory, Plan, Subscription, SubscriptionDirectory, SubscriptionStatus,
};
pub use config::Config;
pub use coordinator::{
    CoordinatorConfig, IdleSweeper, NewUtterance, QuotaStatus, SessionCoordinator, SweepReport,
};
pub use error::{CoordinatorError, CoordinatorResult, ErrorKind, StoreError};
pub use http::{create_router, AppState};
pub use ledger::{
    LedgerKey, LedgerStore, MemoryLedgerStore, QuotaLedger, ReservationToken, Settlement,
    DEFAULT_MAX_CAS_ATTEMPTS,
};
pub use session::{
    InterviewSession, MemorySessionRepository, SessionRepository, SessionState, SessionSummary,
    Speaker, Utterance,
};
pub use transcription::{
    CannedTranscriber, NatsTranscriber, Transcriber, TranscriptionGateway,
};
