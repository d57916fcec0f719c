use super::coordinator::SessionCoordinator;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Background task that periodically abandons idle sessions
pub struct IdleSweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl IdleSweeper {
    /// Spawn the sweep loop on the current runtime
    pub fn spawn(coordinator: SessionCoordinator, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Idle sweeper started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.sweep_idle(Utc::now()).await {
                            error!("Idle sweep failed: {}", e);
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Idle sweeper stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop to stop and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!("Idle sweeper task panicked: {}", e);
        }
    }
}
