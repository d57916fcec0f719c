//! Plans and subscriptions
//!
//! Reference data the quota ledger is evaluated against:
//! - `Plan` - interview allowance per billing period
//! - `Subscription` - a user's plan for one period (at most one active)
//! - `SubscriptionDirectory` - lookup/activation seam, with an in-memory implementation

mod directory;
mod plan;
mod subscription;

pub use directory::{MemorySubscriptionDirectory, SubscriptionDirectory};
pub use plan::{default_free_trial_plan, Plan};
pub use subscription::{Subscription, SubscriptionStatus};
