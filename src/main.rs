use anyhow::{Context, Result};
use clap::Parser;
use intentx_sessions::config::TranscriptionBackend;
use intentx_sessions::{
    create_router, AppState, CannedTranscriber, Config, IdleSweeper, MemoryLedgerStore,
    MemorySessionRepository, MemorySubscriptionDirectory, NatsTranscriber, QuotaLedger,
    SessionCoordinator, Transcriber, TranscriptionGateway,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "intentx-sessions")]
#[command(about = "Interview session service with per-plan quota accounting", long_about = None)]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/intentx-sessions")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let config_path = shellexpand::tilde(&args.config).to_string();
    let cfg = Config::load(&config_path)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let transcriber: Arc<dyn Transcriber> = match cfg.transcription.backend {
        TranscriptionBackend::Nats => Arc::new(
            NatsTranscriber::connect(&cfg.transcription.nats_url, cfg.transcription.subject.clone())
                .await?,
        ),
        TranscriptionBackend::Canned => {
            info!("Using canned transcription phrases");
            Arc::new(CannedTranscriber::new())
        }
    };
    let gateway = TranscriptionGateway::new(
        transcriber,
        cfg.transcription_timeout(),
        cfg.transcription.degraded_mode,
    );

    let subscriptions = Arc::new(MemorySubscriptionDirectory::new(cfg.billing.plans.clone()));
    let ledger = QuotaLedger::new(
        Arc::new(MemoryLedgerStore::new()),
        cfg.ledger.max_cas_attempts,
    )
    .with_settled_retention(cfg.settled_retention());
    let sessions = Arc::new(MemorySessionRepository::new());

    let coordinator = SessionCoordinator::new(
        subscriptions,
        ledger,
        sessions,
        gateway,
        cfg.coordinator_config(),
    );

    let sweeper = IdleSweeper::spawn(coordinator.clone(), cfg.sweep_interval());

    let state = AppState::new(coordinator, cfg.service.max_audio_bytes);
    let app = create_router(state);

    let bind = args.bind.unwrap_or_else(|| cfg.service.http.bind.clone());
    let port = args.port.unwrap_or(cfg.service.http.port);
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    sweeper.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
