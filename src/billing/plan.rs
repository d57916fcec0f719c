use serde::{Deserialize, Serialize};

/// Subscription plan definition (static reference data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier (e.g., "free-trial", "pro-monthly")
    pub id: String,

    /// Display name
    pub name: String,

    /// Interviews allowed per billing period; `None` means unlimited
    #[serde(default)]
    pub interview_limit: Option<u32>,

    /// Price per period in the billing currency
    #[serde(default)]
    pub price: f64,
}

impl Plan {
    pub fn is_unlimited(&self) -> bool {
        self.interview_limit.is_none()
    }

    /// Whether one more interview fits given what is already used or held
    pub fn admits(&self, consumed: u32, reserved: u32) -> bool {
        match self.interview_limit {
            None => true,
            Some(limit) => consumed.saturating_add(reserved) < limit,
        }
    }

    /// Remaining interviews, `None` for unlimited plans
    pub fn remaining(&self, consumed: u32, reserved: u32) -> Option<u32> {
        self.interview_limit
            .map(|limit| limit.saturating_sub(consumed.saturating_add(reserved)))
    }
}

/// The plan handed out when a free trial is provisioned
pub fn default_free_trial_plan() -> Plan {
    Plan {
        id: "free-trial".to_string(),
        name: "Free Trial".to_string(),
        interview_limit: Some(2),
        price: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(limit: Option<u32>) -> Plan {
        Plan {
            id: "p".to_string(),
            name: "P".to_string(),
            interview_limit: limit,
            price: 10.0,
        }
    }

    #[test]
    fn test_limited_plan_admission() {
        let p = plan(Some(2));
        assert!(p.admits(0, 0));
        assert!(p.admits(1, 0));
        assert!(!p.admits(1, 1));
        assert!(!p.admits(2, 0));
        assert_eq!(p.remaining(1, 0), Some(1));
        assert_eq!(p.remaining(3, 0), Some(0));
    }

    #[test]
    fn test_unlimited_plan_always_admits() {
        let p = plan(None);
        assert!(p.is_unlimited());
        assert!(p.admits(u32::MAX, u32::MAX));
        assert_eq!(p.remaining(5, 5), None);
    }

    #[test]
    fn test_zero_limit_plan_admits_nothing() {
        assert!(!plan(Some(0)).admits(0, 0));
    }
}
