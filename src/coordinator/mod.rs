//! Session coordinator
//!
//! Ties the quota ledger, the session state machine and the transcription
//! gateway together, and runs the idle sweep that keeps reservations from
//! being stranded by clients that disappear mid-interview.

mod coordinator;
mod retry;
mod sweeper;

pub use coordinator::{
    CoordinatorConfig, FreeTrial, NewUtterance, QuotaStatus, SessionCoordinator, SweepReport,
};
pub use retry::RetryPolicy;
pub use sweeper::IdleSweeper;
