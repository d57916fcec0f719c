//! Quota ledger
//!
//! Tracks interview usage per user and billing period:
//! - `reserve` claims one unit when a session starts (fails when the plan is exhausted)
//! - `commit` turns the claim into consumption when the session completes
//! - `release` hands the claim back when the session fails or is abandoned

mod entry;
mod quota;
mod store;

pub use entry::{
    LedgerEntry, LedgerKey, ReservationToken, SettleOutcome, SettledReservation, Settlement,
};
pub use quota::{QuotaLedger, DEFAULT_MAX_CAS_ATTEMPTS, DEFAULT_SETTLED_RETENTION};
pub use store::{LedgerStore, MemoryLedgerStore};
