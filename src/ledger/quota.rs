use super::entry::{LedgerEntry, LedgerKey, ReservationToken, SettleOutcome, Settlement};
use super::store::LedgerStore;
use crate::billing::{Plan, Subscription};
use crate::error::{CoordinatorError, CoordinatorResult, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 32;

/// How long settled reservation ids are remembered
pub const DEFAULT_SETTLED_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-user, per-period interview quota
///
/// Every mutation is a load followed by a conditional write of the whole
/// entry, retried on version conflicts, so concurrent reservations for the
/// same user serialise on the stored version. Each write also drops settled
/// ids older than the retention window.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn LedgerStore>,
    max_cas_attempts: u32,
    settled_retention: chrono::Duration,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn LedgerStore>, max_cas_attempts: u32) -> Self {
        Self {
            store,
            max_cas_attempts: max_cas_attempts.max(1),
            settled_retention: retention(DEFAULT_SETTLED_RETENTION),
        }
    }

    pub fn with_settled_retention(mut self, retention_window: Duration) -> Self {
        self.settled_retention = retention(retention_window);
        self
    }

    /// Claim one unit of the subscription's current-period allowance
    pub async fn reserve(
        &self,
        subscription: &Subscription,
        plan: &Plan,
    ) -> CoordinatorResult<ReservationToken> {
        let key = LedgerKey::new(&subscription.user_id, subscription.period_key());
        let reservation_id = Uuid::new_v4();
        let issued_at = Utc::now();

        for attempt in 1..=self.max_cas_attempts {
            let (expected, entry) = self.snapshot(&key).await?;

            if !plan.admits(entry.consumed, entry.reserved) {
                let limit = plan.interview_limit.unwrap_or(u32::MAX);
                info!(
                    "Quota exhausted for {} (consumed={}, reserved={}, limit={})",
                    key, entry.consumed, entry.reserved, limit
                );
                return Err(CoordinatorError::QuotaExceeded {
                    user_id: subscription.user_id.clone(),
                    limit,
                });
            }

            let mut next = entry.with_reservation(reservation_id, issued_at);
            self.prune(&key, &mut next);
            if self.store.compare_and_swap(&key, expected, next).await? {
                info!(
                    "Reserved {} for {} (consumed={}, reserved={})",
                    reservation_id,
                    key,
                    entry.consumed,
                    entry.reserved + 1
                );
                return Ok(ReservationToken {
                    id: reservation_id,
                    key,
                    issued_at,
                });
            }

            debug!("Reserve on {} lost a write race (attempt {})", key, attempt);
            tokio::task::yield_now().await;
        }

        warn!("Giving up reserve on {} after {} attempts", key, self.max_cas_attempts);
        Err(StoreError::Contention {
            attempts: self.max_cas_attempts,
        }
        .into())
    }

    /// Move the reservation into `consumed`
    ///
    /// Returns how the token ended up settled: `Committed` on success or on a
    /// repeated commit, `Released` if it had already been released.
    pub async fn commit(&self, token: &ReservationToken) -> CoordinatorResult<Settlement> {
        self.settle(token, Settlement::Committed).await
    }

    /// Return the reservation to the available allowance
    ///
    /// Returns `Committed` (and changes nothing) if the token was committed first.
    pub async fn release(&self, token: &ReservationToken) -> CoordinatorResult<Settlement> {
        self.settle(token, Settlement::Released).await
    }

    /// Open reservations issued at or before `cutoff`, across all keys
    pub async fn stale_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CoordinatorResult<Vec<ReservationToken>> {
        let open = self.store.list_open().await?;
        Ok(open
            .into_iter()
            .flat_map(|(key, entry)| {
                entry
                    .open_before(cutoff)
                    .map(|(id, issued_at)| ReservationToken {
                        id,
                        key: key.clone(),
                        issued_at,
                    })
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    /// Current counters for a key (zeroed if nothing was ever reserved)
    pub async fn usage(&self, key: &LedgerKey) -> CoordinatorResult<LedgerEntry> {
        Ok(self.snapshot(key).await?.1)
    }

    async fn settle(
        &self,
        token: &ReservationToken,
        settlement: Settlement,
    ) -> CoordinatorResult<Settlement> {
        for attempt in 1..=self.max_cas_attempts {
            let (expected, entry) = self.snapshot(&token.key).await?;

            let mut next = match entry.settle(token.id, settlement, Utc::now()) {
                SettleOutcome::Applied(next) => next,
                SettleOutcome::AlreadySettled(previous) => {
                    debug!(
                        "Reservation {} already {:?}, ignoring {:?}",
                        token.id, previous, settlement
                    );
                    return Ok(previous);
                }
                SettleOutcome::Unknown => {
                    return Err(StoreError::NotFound(format!(
                        "reservation {} on {}",
                        token.id, token.key
                    ))
                    .into());
                }
            };

            self.prune(&token.key, &mut next);

            if self.store.compare_and_swap(&token.key, expected, next.clone()).await? {
                info!(
                    "{:?} reservation {} on {} (consumed={}, reserved={})",
                    settlement, token.id, token.key, next.consumed, next.reserved
                );
                return Ok(settlement);
            }

            debug!(
                "Settle of {} on {} lost a write race (attempt {})",
                token.id, token.key, attempt
            );
            tokio::task::yield_now().await;
        }

        warn!(
            "Giving up settling {} on {} after {} attempts",
            token.id, token.key, self.max_cas_attempts
        );
        Err(StoreError::Contention {
            attempts: self.max_cas_attempts,
        }
        .into())
    }

    fn prune(&self, key: &LedgerKey, entry: &mut LedgerEntry) {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.settled_retention) else {
            return;
        };
        let dropped = entry.prune_settled(cutoff);
        if dropped > 0 {
            debug!("Forgot {} settled reservations on {}", dropped, key);
        }
    }

    async fn snapshot(&self, key: &LedgerKey) -> Result<(Option<u64>, LedgerEntry), StoreError> {
        Ok(match self.store.load(key).await? {
            Some(entry) => (Some(entry.version), entry),
            None => (None, LedgerEntry::default()),
        })
    }
}

fn retention(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
