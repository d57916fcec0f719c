use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

/// A user's subscription to a plan for one billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        user_id: &str,
        plan_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            plan_id: plan_id.to_string(),
            status: SubscriptionStatus::Active,
            period_start,
            period_end,
        }
    }

    /// Active status and `now` inside `[period_start, period_end)`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.period_start <= now
            && now < self.period_end
    }

    /// Identifies the billing period; usage counters are keyed by it
    pub fn period_key(&self) -> String {
        self.period_start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
