use super::retry::RetryPolicy;
use crate::audio::AudioClip;
use crate::billing::{Plan, Subscription, SubscriptionDirectory};
use crate::error::{CoordinatorError, CoordinatorResult, StoreError};
use crate::ledger::{LedgerKey, QuotaLedger, Settlement};
use crate::session::{
    Completion, InterviewSession, SessionPolicy, SessionRepository, SessionState, SessionSummary,
    Speaker, Utterance,
};
use crate::transcription::{Transcript, TranscriptionContext, TranscriptionGateway};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Free-trial provisioning for users who never held a subscription
#[derive(Debug, Clone)]
pub struct FreeTrial {
    pub plan_id: String,
    pub period: chrono::Duration,
}

/// Coordinator behaviour knobs
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub policy: SessionPolicy,
    pub retry: RetryPolicy,
    pub free_trial: Option<FreeTrial>,
    /// Bound on reload-and-retry loops after a lost conditional write
    pub max_update_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            retry: RetryPolicy::default(),
            free_trial: None,
            max_update_attempts: 32,
        }
    }
}

/// An utterance supplied directly by the client (conversation capture)
#[derive(Debug, Clone, Deserialize)]
pub struct NewUtterance {
    pub sequence_no: u64,
    pub source: Speaker,
    pub text: String,
}

/// A user's standing against their plan for the current period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub user_id: String,
    pub plan_id: String,
    pub plan_name: String,
    /// `None` for unlimited plans
    pub interview_limit: Option<u32>,
    pub consumed: u32,
    pub reserved: u32,
    /// `None` for unlimited plans
    pub remaining: Option<u32>,
    pub can_start: bool,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// What one idle sweep did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Sessions moved to `Abandoned`
    pub abandoned: Vec<Uuid>,
    /// Idle sessions whose reservation had already been committed, now `Completed`
    pub reconciled: Vec<Uuid>,
    /// Reservations released that no live session held
    pub orphans_released: usize,
    pub errors: usize,
}

/// Why a live session is being ended with its reservation released
#[derive(Debug, Clone, Copy)]
enum ReleaseCause<'a> {
    Abort(&'a str),
    Idle(DateTime<Utc>),
}

/// Orchestrates subscriptions, the quota ledger, session state and transcription
///
/// The only component that moves state across those boundaries. For every
/// session the terminal state written follows how the ledger settled the
/// reservation: `Committed` ends `Completed`, `Released` ends `Failed` or
/// `Abandoned`, whichever caller got there first.
#[derive(Clone)]
pub struct SessionCoordinator {
    subscriptions: Arc<dyn SubscriptionDirectory>,
    ledger: QuotaLedger,
    sessions: Arc<dyn SessionRepository>,
    gateway: TranscriptionGateway,
    config: Arc<CoordinatorConfig>,
}

impl SessionCoordinator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionDirectory>,
        ledger: QuotaLedger,
        sessions: Arc<dyn SessionRepository>,
        gateway: TranscriptionGateway,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            subscriptions,
            ledger,
            sessions,
            gateway,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Admit a new interview session against the user's quota
    pub async fn start_session(
        &self,
        user_id: &str,
        job_id: Option<String>,
    ) -> CoordinatorResult<Uuid> {
        let now = Utc::now();
        let (subscription, plan) = self.resolve_subscription(user_id, now).await?;
        let token = self.ledger.reserve(&subscription, &plan).await?;

        let session = InterviewSession::create(user_id, job_id, token, now);
        if let Err(e) = self.sessions.insert(&session).await {
            error!("Failed to store session {}: {}", session.session_id, e);
            if let Err(release_err) = self.ledger.release(&session.reservation).await {
                warn!(
                    "Reservation {} left open for the idle sweep: {}",
                    session.reservation.id, release_err
                );
            }
            return Err(e.into());
        }

        info!(
            "Session {} started for user {} on plan {}",
            session.session_id, user_id, plan.id
        );
        Ok(session.session_id)
    }

    /// Transcribe a clip and append it as the next candidate utterance
    ///
    /// With `best_effort`, a placeholder utterance is appended when the
    /// provider stays unavailable and the gateway runs in degraded mode.
    pub async fn submit_audio(
        &self,
        session_id: Uuid,
        clip: AudioClip,
        best_effort: bool,
    ) -> CoordinatorResult<Utterance> {
        let session = self.load(session_id).await?;
        session.ensure_live()?;

        let context = TranscriptionContext {
            session_id,
            sequence_no: session.next_sequence_no()?,
        };
        let transcript = self.transcribe_with_retry(&clip, context, best_effort).await?;

        let utterance = self
            .update_with(session_id, |s| {
                let now = Utc::now();
                let utterance = s.candidate_utterance(
                    transcript.text.clone(),
                    clip.duration_seconds,
                    transcript.degraded,
                    now,
                )?;
                s.append_utterance(utterance.clone(), now)?;
                Ok(utterance)
            })
            .await?;

        info!(
            "Session {} utterance #{} appended ({} chars{})",
            session_id,
            utterance.sequence_no,
            utterance.text.len(),
            if utterance.degraded { ", degraded" } else { "" }
        );
        Ok(utterance)
    }

    /// Append a caller-numbered utterance (e.g. the interviewer's prompts)
    pub async fn append_utterance(
        &self,
        session_id: Uuid,
        new: NewUtterance,
    ) -> CoordinatorResult<Utterance> {
        let utterance = self
            .update_with(session_id, |s| {
                let now = Utc::now();
                let utterance = Utterance {
                    sequence_no: new.sequence_no,
                    source: new.source,
                    text: new.text.clone(),
                    timestamp: now,
                    audio_seconds: None,
                    degraded: false,
                };
                s.append_utterance(utterance.clone(), now)?;
                Ok(utterance)
            })
            .await?;

        info!(
            "Session {} utterance #{} appended by {:?}",
            session_id, utterance.sequence_no, utterance.source
        );
        Ok(utterance)
    }

    /// Complete the session and commit its quota unit
    ///
    /// Repeating the call on a completed session returns the stored summary.
    pub async fn finish_session(&self, session_id: Uuid) -> CoordinatorResult<SessionSummary> {
        for _ in 0..self.config.max_update_attempts {
            let mut session = self.load(session_id).await?;
            if let Completion::AlreadyCompleted(summary) =
                session.begin_completion(&self.config.policy)?
            {
                return Ok(summary);
            }

            let settlement = self.ledger.commit(&session.reservation).await?;
            let now = Utc::now();
            match settlement {
                Settlement::Committed => session.mark_completed(now),
                Settlement::Released => {
                    warn!(
                        "Session {} lost its reservation before completing",
                        session_id
                    );
                    session.mark_failed("reservation released before completion", now);
                }
            }

            if self.sessions.update(&mut session).await? {
                if settlement == Settlement::Released {
                    return Err(session.invalid_state());
                }
                let summary = session.summary(now);
                info!(
                    "Session {} completed: {:.1}s, {} utterances",
                    session_id, summary.duration_seconds, summary.utterance_count
                );
                return Ok(summary);
            }
        }

        Err(self.contention())
    }

    /// Fail the session and release its quota unit
    ///
    /// A no-op on terminal sessions; returns the state the session ended in.
    pub async fn abort_session(
        &self,
        session_id: Uuid,
        reason: &str,
    ) -> CoordinatorResult<SessionState> {
        let (session, _) = self
            .release_session(session_id, ReleaseCause::Abort(reason))
            .await?;
        Ok(session.state)
    }

    pub async fn get_session(&self, session_id: Uuid) -> CoordinatorResult<InterviewSession> {
        self.load(session_id).await
    }

    pub async fn list_user_sessions(
        &self,
        user_id: &str,
    ) -> CoordinatorResult<Vec<InterviewSession>> {
        Ok(self.sessions.list_for_user(user_id).await?)
    }

    /// Current-period usage against the user's plan
    pub async fn quota_status(&self, user_id: &str) -> CoordinatorResult<QuotaStatus> {
        let now = Utc::now();
        let (subscription, plan) = self.resolve_subscription(user_id, now).await?;
        let key = LedgerKey::new(user_id, subscription.period_key());
        let usage = self.ledger.usage(&key).await?;

        Ok(QuotaStatus {
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            plan_name: plan.name.clone(),
            interview_limit: plan.interview_limit,
            consumed: usage.consumed,
            reserved: usage.reserved,
            remaining: plan.remaining(usage.consumed, usage.reserved),
            can_start: plan.admits(usage.consumed, usage.reserved),
            period_start: subscription.period_start,
            period_end: subscription.period_end,
        })
    }

    pub async fn plans(&self) -> CoordinatorResult<Vec<Plan>> {
        Ok(self.subscriptions.plans().await?)
    }

    /// Record a purchased plan for `period` starting now
    pub async fn activate_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
        period: chrono::Duration,
    ) -> CoordinatorResult<Subscription> {
        if self.subscriptions.plan(plan_id).await?.is_none() {
            return Err(CoordinatorError::UnknownPlan(plan_id.to_string()));
        }
        let now = Utc::now();
        Ok(self
            .subscriptions
            .activate(user_id, plan_id, now, now + period)
            .await?)
    }

    pub async fn cancel_subscription(
        &self,
        user_id: &str,
    ) -> CoordinatorResult<Option<Subscription>> {
        Ok(self.subscriptions.cancel(user_id).await?)
    }

    /// Abandon idle sessions and release reservations nobody holds
    ///
    /// Errors on individual sessions are logged and counted, not returned.
    pub async fn sweep_idle(&self, now: DateTime<Utc>) -> CoordinatorResult<SweepReport> {
        let policy = &self.config.policy;
        let mut report = SweepReport::default();
        let live = self.sessions.list_live().await?;
        let held: HashSet<Uuid> = live.iter().map(|s| s.reservation.id).collect();

        for session in live.iter().filter(|s| s.is_idle(now, policy)) {
            match self
                .release_session(session.session_id, ReleaseCause::Idle(now))
                .await
            {
                Ok((s, true)) if s.state == SessionState::Abandoned => {
                    report.abandoned.push(s.session_id)
                }
                Ok((s, true)) if s.state == SessionState::Completed => {
                    report.reconciled.push(s.session_id)
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Idle sweep failed on session {}: {}", session.session_id, e);
                    report.errors += 1;
                }
            }
        }

        let idle_timeout = chrono::Duration::from_std(policy.idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = now - idle_timeout;
        for token in self.ledger.stale_reservations(cutoff).await? {
            if held.contains(&token.id) {
                continue;
            }
            match self.ledger.release(&token).await {
                Ok(Settlement::Released) => {
                    info!("Released stranded reservation {} on {}", token.id, token.key);
                    report.orphans_released += 1;
                }
                Ok(Settlement::Committed) => {}
                Err(e) => {
                    warn!("Failed to release stranded reservation {}: {}", token.id, e);
                    report.errors += 1;
                }
            }
        }

        if !report.abandoned.is_empty() || report.orphans_released > 0 {
            info!(
                "Idle sweep: {} abandoned, {} reconciled, {} orphan reservations released",
                report.abandoned.len(),
                report.reconciled.len(),
                report.orphans_released
            );
        }
        Ok(report)
    }

    /// Release the reservation and write the matching terminal state
    ///
    /// Returns the session and whether this call changed it.
    async fn release_session(
        &self,
        session_id: Uuid,
        cause: ReleaseCause<'_>,
    ) -> CoordinatorResult<(InterviewSession, bool)> {
        for _ in 0..self.config.max_update_attempts {
            let mut session = self.load(session_id).await?;
            if session.state.is_terminal() {
                return Ok((session, false));
            }
            if let ReleaseCause::Idle(now) = cause {
                if !session.is_idle(now, &self.config.policy) {
                    return Ok((session, false));
                }
            }

            let settlement = self.ledger.release(&session.reservation).await?;
            let now = Utc::now();
            match (settlement, cause) {
                (Settlement::Committed, _) => {
                    warn!(
                        "Session {} reservation was already committed, marking completed",
                        session_id
                    );
                    session.mark_completed(now);
                }
                (Settlement::Released, ReleaseCause::Abort(reason)) => {
                    session.mark_failed(reason, now)
                }
                (Settlement::Released, ReleaseCause::Idle(_)) => session.mark_abandoned(now),
            }

            if self.sessions.update(&mut session).await? {
                info!("Session {} ended as {}", session_id, session.state);
                return Ok((session, true));
            }
        }

        Err(self.contention())
    }

    /// Load, mutate and conditionally write a session, retrying lost races
    async fn update_with<T, F>(&self, session_id: Uuid, mut apply: F) -> CoordinatorResult<T>
    where
        F: FnMut(&mut InterviewSession) -> CoordinatorResult<T> + Send,
        T: Send,
    {
        for _ in 0..self.config.max_update_attempts {
            let mut session = self.load(session_id).await?;
            let value = apply(&mut session)?;
            if self.sessions.update(&mut session).await? {
                return Ok(value);
            }
        }

        Err(self.contention())
    }

    async fn transcribe_with_retry(
        &self,
        clip: &AudioClip,
        context: TranscriptionContext,
        best_effort: bool,
    ) -> CoordinatorResult<Transcript> {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.gateway.transcribe(clip, context).await {
                Ok(transcript) => return Ok(transcript),
                Err(e) => {
                    warn!(
                        "Transcription attempt {}/{} for session {} failed: {}",
                        attempt, attempts, context.session_id, e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(retry.delay_after(attempt)).await;
                    }
                }
            }
        }

        if best_effort {
            if let Some(placeholder) = self.gateway.degraded() {
                warn!(
                    "Using degraded transcript for session {} #{}",
                    context.session_id, context.sequence_no
                );
                return Ok(placeholder);
            }
        }

        Err(CoordinatorError::TranscriptionUnavailable(
            last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
        ))
    }

    /// Active subscription and its plan, provisioning a free trial if configured
    async fn resolve_subscription(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> CoordinatorResult<(Subscription, Plan)> {
        let mut active = self.subscriptions.active_subscription(user_id, now).await?;

        if active.is_none() {
            if let Some(trial) = &self.config.free_trial {
                let candidate = Subscription::new(user_id, &trial.plan_id, now, now + trial.period);
                active = match self.subscriptions.activate_if_absent(candidate).await? {
                    Some(sub) => {
                        info!("Provisioned free trial {} for user {}", sub.plan_id, user_id);
                        Some(sub)
                    }
                    // Someone else may have provisioned it concurrently
                    None => self.subscriptions.active_subscription(user_id, now).await?,
                };
            }
        }

        let Some(subscription) = active else {
            info!("User {} has no active subscription", user_id);
            return Err(CoordinatorError::SubscriptionInactive {
                user_id: user_id.to_string(),
            });
        };

        let plan = self
            .subscriptions
            .plan(&subscription.plan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("plan {}", subscription.plan_id)))?;

        Ok((subscription, plan))
    }

    async fn load(&self, session_id: Uuid) -> CoordinatorResult<InterviewSession> {
        self.sessions
            .load(session_id)
            .await?
            .ok_or(CoordinatorError::SessionNotFound(session_id))
    }

    fn contention(&self) -> CoordinatorError {
        StoreError::Contention {
            attempts: self.config.max_update_attempts,
        }
        .into()
    }
}
