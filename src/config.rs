use crate::billing::{default_free_trial_plan, Plan};
use crate::coordinator::{CoordinatorConfig, FreeTrial, RetryPolicy};
use crate::ledger::{DEFAULT_MAX_CAS_ATTEMPTS, DEFAULT_SETTLED_RETENTION};
use crate::session::SessionPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub sessions: SessionsConfig,
    pub ledger: LedgerConfig,
    pub transcription: TranscriptionConfig,
    pub billing: BillingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Largest accepted audio upload
    pub max_audio_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "intentx-sessions".to_string(),
            http: HttpConfig::default(),
            max_audio_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub allow_empty_completion: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 900,
            sweep_interval_secs: 30,
            allow_empty_completion: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Conditional-write retries before reporting contention
    pub max_cas_attempts: u32,

    /// How long settled reservation ids answer duplicate commit/release calls
    pub settled_retention_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
            settled_retention_secs: DEFAULT_SETTLED_RETENTION.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionBackend {
    /// STT service over NATS request/reply
    Nats,
    /// Fixed phrases, no external service
    Canned,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub backend: TranscriptionBackend,
    pub nats_url: String,
    pub subject: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Allow placeholder transcripts for best-effort requests
    pub degraded_mode: bool,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            backend: TranscriptionBackend::Nats,
            nats_url: "nats://localhost:4222".to_string(),
            subject: "stt.transcribe".to_string(),
            timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 200,
            degraded_mode: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub plans: Vec<Plan>,
    pub free_trial: Option<FreeTrialConfig>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            plans: vec![default_free_trial_plan()],
            free_trial: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FreeTrialConfig {
    pub plan_id: String,
    pub period_days: i64,
}

impl Config {
    /// Load `path` (any format the `config` crate knows, extension optional)
    /// layered under `INTENTX__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("INTENTX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(trial) = &self.billing.free_trial {
            if !self.billing.plans.iter().any(|p| p.id == trial.plan_id) {
                anyhow::bail!(
                    "billing.free_trial.plan_id {} is not among billing.plans",
                    trial.plan_id
                );
            }
            if trial.period_days <= 0 {
                anyhow::bail!("billing.free_trial.period_days must be positive");
            }
        }
        Ok(())
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            idle_timeout: Duration::from_secs(self.sessions.idle_timeout_secs),
            allow_empty_completion: self.sessions.allow_empty_completion,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.transcription.max_attempts.max(1),
            base_delay: Duration::from_millis(self.transcription.backoff_base_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            policy: self.session_policy(),
            retry: self.retry_policy(),
            free_trial: self.billing.free_trial.as_ref().map(|trial| FreeTrial {
                plan_id: trial.plan_id.clone(),
                period: chrono::Duration::days(trial.period_days),
            }),
            max_update_attempts: self.ledger.max_cas_attempts.max(1),
        }
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_millis(self.transcription.timeout_ms)
    }

    pub fn settled_retention(&self) -> Duration {
        Duration::from_secs(self.ledger.settled_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_secs.max(1))
    }
}
