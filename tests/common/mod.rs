// Shared wiring for the integration tests
//
// Builds a coordinator on the in-memory stores with fast retries and lets
// each test pick its plans and transcription backend.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hound::{SampleFormat, WavSpec, WavWriter};
use intentx_sessions::coordinator::{CoordinatorConfig, RetryPolicy};
use intentx_sessions::transcription::{Transcript, TranscriptionContext, TranscriptionError};
use intentx_sessions::{
    AudioClip, CannedTranscriber, LedgerKey, MemoryLedgerStore, MemorySessionRepository,
    MemorySubscriptionDirectory, Plan, QuotaLedger, SessionCoordinator, Subscription,
    SubscriptionDirectory, Transcriber, TranscriptionGateway, DEFAULT_MAX_CAS_ATTEMPTS,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_AUDIO_BYTES: usize = 1024 * 1024;

pub fn plan(id: &str, limit: Option<u32>) -> Plan {
    Plan {
        id: id.to_string(),
        name: id.to_uppercase(),
        interview_limit: limit,
        price: limit.map_or(99.0, |l| l as f64),
    }
}

pub struct Harness {
    pub coordinator: SessionCoordinator,
    pub subscriptions: Arc<MemorySubscriptionDirectory>,
    pub ledger: QuotaLedger,
}

impl Harness {
    /// Activate `plan_id` for `user_id` starting now, for 30 days
    pub async fn subscribe(&self, user_id: &str, plan_id: &str) -> Result<Subscription> {
        let now = Utc::now();
        Ok(self
            .subscriptions
            .activate(user_id, plan_id, now, now + ChronoDuration::days(30))
            .await?)
    }

    pub async fn usage(&self, subscription: &Subscription) -> Result<(u32, u32)> {
        let key = LedgerKey::new(&subscription.user_id, subscription.period_key());
        let entry = self.ledger.usage(&key).await?;
        Ok((entry.consumed, entry.reserved))
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..CoordinatorConfig::default()
    }
}

pub fn harness(plans: Vec<Plan>) -> Harness {
    harness_with(plans, Arc::new(CannedTranscriber::new()), false, test_config())
}

pub fn harness_with(
    plans: Vec<Plan>,
    transcriber: Arc<dyn Transcriber>,
    degraded_mode: bool,
    config: CoordinatorConfig,
) -> Harness {
    let subscriptions = Arc::new(MemorySubscriptionDirectory::new(plans));
    let ledger = QuotaLedger::new(Arc::new(MemoryLedgerStore::new()), DEFAULT_MAX_CAS_ATTEMPTS);
    let gateway = TranscriptionGateway::new(transcriber, Duration::from_millis(200), degraded_mode);

    let coordinator = SessionCoordinator::new(
        subscriptions.clone(),
        ledger.clone(),
        Arc::new(MemorySessionRepository::new()),
        gateway,
        config,
    );

    Harness {
        coordinator,
        subscriptions,
        ledger,
    }
}

/// Silent 16-bit mono WAV of the given length
pub fn wav_bytes(seconds: f64, sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        let samples = (seconds * sample_rate as f64) as usize;
        for _ in 0..samples {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub fn wav_clip(seconds: f64) -> Result<AudioClip> {
    let bytes = wav_bytes(seconds, 16000)?;
    Ok(AudioClip::from_bytes(
        bytes,
        Some("audio/wav".to_string()),
        MAX_AUDIO_BYTES,
    )?)
}

/// Fails the first `failures` calls, then answers with a fixed phrase
pub struct FlakyTranscriber {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyTranscriber {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FlakyTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        _context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(TranscriptionError::RequestFailed("connection refused".into()));
        }
        Ok(Transcript {
            text: "I enjoy debugging distributed systems".to_string(),
            confidence: Some(0.9),
            degraded: false,
        })
    }
}

/// Never answers within any reasonable timeout
pub struct StalledTranscriber;

#[async_trait]
impl Transcriber for StalledTranscriber {
    async fn transcribe(
        &self,
        _clip: &AudioClip,
        _context: TranscriptionContext,
    ) -> Result<Transcript, TranscriptionError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(TranscriptionError::EmptyResponse)
    }
}
