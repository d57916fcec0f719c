use super::config::SessionPolicy;
use super::state::SessionState;
use super::stats::{SessionSummary, Speaker, Utterance};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ledger::ReservationToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What `complete` should do for a session in its current state
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Commit the reservation, then mark the session completed
    Proceed,
    /// Already completed earlier; hand back the stored summary
    AlreadyCompleted(SessionSummary),
}

/// One interview session and its transcript
///
/// Transition methods only validate and mutate this record. Quota side
/// effects (commit/release of `reservation`) are performed by the coordinator
/// before it persists the new state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewSession {
    pub session_id: Uuid,

    pub user_id: String,

    /// Job posting the interview is for, if any
    pub job_id: Option<String>,

    pub state: SessionState,

    /// The quota unit this session holds
    pub reservation: ReservationToken,

    pub created_at: DateTime<Utc>,

    /// Creation or the latest appended utterance
    pub last_activity_at: DateTime<Utc>,

    /// Set on the terminal transition
    pub ended_at: Option<DateTime<Utc>>,

    pub transcript: Vec<Utterance>,

    pub audio_seconds: f64,

    pub duration_seconds: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Storage version used for conditional updates
    #[serde(default)]
    pub version: u64,
}

impl InterviewSession {
    /// New `Pending` session bound to a fresh reservation
    pub fn create(
        user_id: &str,
        job_id: Option<String>,
        reservation: ReservationToken,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            job_id,
            state: SessionState::Pending,
            reservation,
            created_at: now,
            last_activity_at: now,
            ended_at: None,
            transcript: Vec::new(),
            audio_seconds: 0.0,
            duration_seconds: 0.0,
            failure_reason: None,
            version: 0,
        }
    }

    /// `None` while the transcript is empty
    pub fn last_sequence_no(&self) -> Option<u64> {
        self.transcript.last().map(|u| u.sequence_no)
    }

    /// Number for the next server-assigned utterance, starting at 1
    ///
    /// Fails once a caller-numbered utterance has used up the sequence space.
    pub fn next_sequence_no(&self) -> CoordinatorResult<u64> {
        match self.last_sequence_no() {
            None => Ok(1),
            Some(last) => last
                .checked_add(1)
                .ok_or(CoordinatorError::OutOfOrderUtterance { last, got: last }),
        }
    }

    /// Reject anything but `Pending`/`InProgress`
    pub fn ensure_live(&self) -> CoordinatorResult<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_state());
        }
        Ok(())
    }

    /// Append to the transcript, moving `Pending -> InProgress`
    ///
    /// Leaves the transcript untouched on any error.
    pub fn append_utterance(
        &mut self,
        utterance: Utterance,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<()> {
        self.ensure_live()?;

        if let Some(last) = self.last_sequence_no() {
            if utterance.sequence_no <= last {
                return Err(CoordinatorError::OutOfOrderUtterance {
                    last,
                    got: utterance.sequence_no,
                });
            }
        }

        if let Some(secs) = utterance.audio_seconds {
            self.audio_seconds += secs;
        }
        self.transcript.push(utterance);
        self.state = SessionState::InProgress;
        self.last_activity_at = now;
        Ok(())
    }

    /// Build the next candidate utterance from transcribed text
    pub fn candidate_utterance(
        &self,
        text: String,
        audio_seconds: Option<f64>,
        degraded: bool,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<Utterance> {
        Ok(Utterance {
            sequence_no: self.next_sequence_no()?,
            source: Speaker::Candidate,
            text,
            timestamp: now,
            audio_seconds,
            degraded,
        })
    }

    /// Decide whether a completion request may go ahead
    pub fn begin_completion(&self, policy: &SessionPolicy) -> CoordinatorResult<Completion> {
        match self.state {
            SessionState::Completed => Ok(Completion::AlreadyCompleted(self.summary(Utc::now()))),
            SessionState::Failed | SessionState::Abandoned => Err(self.invalid_state()),
            SessionState::Pending if !policy.allow_empty_completion => Err(self.invalid_state()),
            SessionState::Pending | SessionState::InProgress => Ok(Completion::Proceed),
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.finish(SessionState::Completed, now);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.failure_reason = Some(reason.into());
        self.finish(SessionState::Failed, now);
    }

    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) {
        self.failure_reason = Some("idle timeout".to_string());
        self.finish(SessionState::Abandoned, now);
    }

    /// Live and quiet for at least `idle_timeout`
    pub fn is_idle(&self, now: DateTime<Utc>, policy: &SessionPolicy) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let idle = now.signed_duration_since(self.last_activity_at);
        idle.to_std().is_ok_and(|idle| idle >= policy.idle_timeout)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let duration_seconds = match self.ended_at {
            Some(_) => self.duration_seconds,
            None => seconds_between(self.created_at, now),
        };

        SessionSummary {
            session_id: self.session_id,
            state: self.state,
            duration_seconds,
            utterance_count: self.transcript.len(),
            audio_seconds: self.audio_seconds,
        }
    }

    pub fn invalid_state(&self) -> CoordinatorError {
        CoordinatorError::InvalidSessionState {
            session_id: self.session_id,
            state: self.state,
        }
    }

    fn finish(&mut self, state: SessionState, now: DateTime<Utc>) {
        debug_assert!(self.state.can_transition_to(state));
        self.state = state;
        self.ended_at = Some(now);
        self.duration_seconds = seconds_between(self.created_at, now);
    }
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end.signed_duration_since(start).num_milliseconds().max(0)) as f64 / 1000.0
}
