use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle policy applied to every interview session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// A live session with no activity for this long is abandoned
    /// Default: 900 seconds (15 minutes)
    pub idle_timeout: Duration,

    /// Allow `complete` straight from `Pending` (no utterances)
    pub allow_empty_completion: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(900), // 15 minutes
            allow_empty_completion: false,
        }
    }
}
