use super::plan::Plan;
use super::subscription::{Subscription, SubscriptionStatus};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Read-mostly lookup of plans and subscriptions
///
/// Subscriptions are written by the payment flow; the coordinator only reads
/// them, except for free-trial provisioning.
#[async_trait]
pub trait SubscriptionDirectory: Send + Sync {
    /// All plans, cheapest first
    async fn plans(&self) -> Result<Vec<Plan>, StoreError>;

    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError>;

    /// The subscription active at `now`, if any
    ///
    /// Subscriptions whose period has ended are reported as expired.
    async fn active_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Activate a subscription, cancelling whichever one was active before
    async fn activate(
        &self,
        user_id: &str,
        plan_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Subscription, StoreError>;

    /// Insert `subscription` only if the user has never held one
    ///
    /// Returns the inserted subscription, or `None` when the user already has
    /// (or had) a subscription.
    async fn activate_if_absent(
        &self,
        subscription: Subscription,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Cancel the user's active subscription, returning it
    async fn cancel(&self, user_id: &str) -> Result<Option<Subscription>, StoreError>;
}

#[derive(Default)]
struct DirectoryInner {
    plans: HashMap<String, Plan>,
    subscriptions: HashMap<String, Vec<Subscription>>,
}

/// In-process subscription directory
#[derive(Default)]
pub struct MemorySubscriptionDirectory {
    inner: Mutex<DirectoryInner>,
}

impl MemorySubscriptionDirectory {
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        let plans = plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            inner: Mutex::new(DirectoryInner {
                plans,
                subscriptions: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DirectoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("subscription directory lock poisoned".into()))
    }
}

/// Flip subscriptions whose period has ended to `Expired`
fn expire_lapsed(subs: &mut [Subscription], now: DateTime<Utc>) {
    for sub in subs.iter_mut() {
        if sub.status == SubscriptionStatus::Active && now >= sub.period_end {
            info!("Subscription {} for user {} expired", sub.id, sub.user_id);
            sub.status = SubscriptionStatus::Expired;
        }
    }
}

#[async_trait]
impl SubscriptionDirectory for MemorySubscriptionDirectory {
    async fn plans(&self) -> Result<Vec<Plan>, StoreError> {
        let inner = self.lock()?;
        let mut plans: Vec<Plan> = inner.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.price.total_cmp(&b.price).then_with(|| a.id.cmp(&b.id)));
        Ok(plans)
    }

    async fn plan(&self, plan_id: &str) -> Result<Option<Plan>, StoreError> {
        Ok(self.lock()?.plans.get(plan_id).cloned())
    }

    async fn active_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut inner = self.lock()?;
        let Some(subs) = inner.subscriptions.get_mut(user_id) else {
            return Ok(None);
        };
        expire_lapsed(subs, now);
        Ok(subs.iter().find(|s| s.is_active_at(now)).cloned())
    }

    async fn activate(
        &self,
        user_id: &str,
        plan_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.lock()?;
        if !inner.plans.contains_key(plan_id) {
            return Err(StoreError::NotFound(format!("plan {}", plan_id)));
        }

        let subs = inner.subscriptions.entry(user_id.to_string()).or_default();
        for sub in subs.iter_mut() {
            if sub.status == SubscriptionStatus::Active {
                info!("Cancelling subscription {} superseded by new purchase", sub.id);
                sub.status = SubscriptionStatus::Cancelled;
            }
        }

        let sub = Subscription::new(user_id, plan_id, period_start, period_end);
        subs.push(sub.clone());
        info!("Activated plan {} for user {}", plan_id, user_id);
        Ok(sub)
    }

    async fn activate_if_absent(
        &self,
        subscription: Subscription,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut inner = self.lock()?;
        if !inner.plans.contains_key(&subscription.plan_id) {
            return Err(StoreError::NotFound(format!("plan {}", subscription.plan_id)));
        }

        let subs = inner
            .subscriptions
            .entry(subscription.user_id.clone())
            .or_default();
        if !subs.is_empty() {
            return Ok(None);
        }
        subs.push(subscription.clone());
        Ok(Some(subscription))
    }

    async fn cancel(&self, user_id: &str) -> Result<Option<Subscription>, StoreError> {
        let mut inner = self.lock()?;
        let Some(subs) = inner.subscriptions.get_mut(user_id) else {
            return Ok(None);
        };
        let cancelled = subs
            .iter_mut()
            .find(|s| s.status == SubscriptionStatus::Active)
            .map(|s| {
                s.status = SubscriptionStatus::Cancelled;
                s.clone()
            });
        if let Some(sub) = &cancelled {
            info!("Cancelled subscription {} for user {}", sub.id, user_id);
        }
        Ok(cancelled)
    }
}
