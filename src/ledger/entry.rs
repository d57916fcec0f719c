use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Ledger record key: one user in one billing period
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub user_id: String,
    pub period_key: String,
}

impl LedgerKey {
    pub fn new(user_id: impl Into<String>, period_key: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            period_key: period_key.into(),
        }
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.period_key)
    }
}

/// How a reservation was finally settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Committed,
    Released,
}

/// Settled reservation remembered for duplicate commit/release calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledReservation {
    pub settlement: Settlement,
    pub settled_at: DateTime<Utc>,
}

/// Claim on one unit of quota, bound to the session that holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationToken {
    pub id: Uuid,
    pub key: LedgerKey,
    pub issued_at: DateTime<Utc>,
}

/// Usage counters for one `LedgerKey`
///
/// `reserved` always equals `open.len()`. Open reservations remember when they
/// were issued so stranded ones can be found. Settled reservation ids are kept
/// for a retention window so a repeated commit/release can report what already
/// happened instead of moving the counters twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub consumed: u32,
    pub reserved: u32,
    pub open: BTreeMap<Uuid, DateTime<Utc>>,
    pub settled: BTreeMap<Uuid, SettledReservation>,
    /// Bumped by the store on every successful write
    pub version: u64,
}

/// Result of applying a settlement to an entry
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Counters moved; write this entry back
    Applied(LedgerEntry),
    /// The reservation was settled earlier, nothing to write
    AlreadySettled(Settlement),
    /// The reservation id was never issued against this entry
    Unknown,
}

impl LedgerEntry {
    pub fn with_reservation(
        &self,
        reservation_id: Uuid,
        issued_at: DateTime<Utc>,
    ) -> LedgerEntry {
        let mut next = self.clone();
        if next.open.insert(reservation_id, issued_at).is_none() {
            next.reserved += 1;
        }
        next
    }

    /// Open reservations issued at or before `cutoff`
    pub fn open_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Iterator<Item = (Uuid, DateTime<Utc>)> + '_ {
        self.open
            .iter()
            .filter(move |(_, issued_at)| **issued_at <= cutoff)
            .map(|(id, issued_at)| (*id, *issued_at))
    }

    pub fn settle(
        &self,
        reservation_id: Uuid,
        settlement: Settlement,
        settled_at: DateTime<Utc>,
    ) -> SettleOutcome {
        if let Some(previous) = self.settled.get(&reservation_id) {
            return SettleOutcome::AlreadySettled(previous.settlement);
        }
        if !self.open.contains_key(&reservation_id) {
            return SettleOutcome::Unknown;
        }

        let mut next = self.clone();
        next.open.remove(&reservation_id);
        next.reserved = next.reserved.saturating_sub(1);
        if settlement == Settlement::Committed {
            next.consumed += 1;
        }
        next.settled.insert(
            reservation_id,
            SettledReservation {
                settlement,
                settled_at,
            },
        );
        SettleOutcome::Applied(next)
    }

    /// Forget settlements recorded before `cutoff`; returns how many were dropped
    ///
    /// Counters are untouched. A forgotten id settles as `Unknown` afterwards.
    pub fn prune_settled(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.settled.len();
        self.settled.retain(|_, s| s.settled_at >= cutoff);
        before - self.settled.len()
    }
}
