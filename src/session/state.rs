use serde::{Deserialize, Serialize};

/// Lifecycle state of an interview session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Quota reserved, no utterance yet
    Pending,
    /// At least one utterance recorded
    InProgress,
    /// Terminal, quota committed
    Completed,
    /// Terminal, quota released
    Failed,
    /// Terminal, idle timeout hit, quota released
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Abandoned)
    }

    /// Whether the lifecycle permits moving from `self` to `next`
    ///
    /// `Pending -> Completed` is listed here; whether it is actually allowed is
    /// a policy decision made by the caller.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Pending, InProgress) | (Pending, Completed) => true,
            (InProgress, InProgress) | (InProgress, Completed) => true,
            (Pending | InProgress, Failed | Abandoned) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
