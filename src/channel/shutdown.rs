use super::handle::ControlChannel;
use super::types::SimulationState;
use crate::error::DrainError;
use crate::events::LifecycleEvent;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info, warn};

impl ControlChannel {
    /// Run the drain on its own task; it ends by committing `Terminated`
    pub(super) fn spawn_drain(&self) {
        let channel = self.clone();
        tokio::spawn(async move {
            channel.drain().await;
            channel.terminate().await;
        });
    }

    async fn drain(&self) {
        let drainer = Arc::clone(&self.shared.drainer);
        let warn_after = self.shared.config.drain.warn_after();
        info!("Beginning drain ({})", drainer.name());

        self.notify(LifecycleEvent::DrainStarted {
            timestamp: SystemTime::now(),
        })
        .await;

        // A panicking drainer must not keep the channel from terminating
        let mut drain = tokio::spawn({
            let drainer = Arc::clone(&drainer);
            async move { drainer.drain().await }
        });

        let joined = tokio::select! {
            joined = &mut drain => joined,
            _ = tokio::time::sleep(warn_after) => {
                warn!("Drain still running after {:?}, continuing to wait", warn_after);
                drain.await
            }
        };

        let result = joined.unwrap_or_else(|e| {
            error!("Drain task ({}) did not complete: {}", drainer.name(), e);
            Err(DrainError::failed(format!("drain task aborted: {}", e)))
        });

        match result {
            Ok(()) => {
                self.shared.stats.record_drain(true);
                info!("Drain completed");
            }
            Err(e) => {
                self.shared.stats.record_drain(false);
                warn!("Terminating after drain error ({})", drainer.name());
                self.notify(LifecycleEvent::DrainFailed {
                    error: e.to_string(),
                    timestamp: SystemTime::now(),
                })
                .await;
            }
        }
    }

    /// Commit `ShuttingDown -> Terminated` and tear the channel down
    async fn terminate(&self) {
        // Not bounded by the lock timeout: termination has to commit
        let mut guarded = self.shared.guarded.lock().await;
        if guarded.current != SimulationState::ShuttingDown {
            warn!(
                "Drain finished while simulation was {}, not terminating",
                guarded.current
            );
            return;
        }

        let transition = self
            .commit(&mut guarded, SimulationState::Terminated, None, None, None)
            .await;
        drop(guarded);

        info!(
            "Simulation {} -> {} (#{})",
            transition.from, transition.to, transition.sequence
        );

        self.shared.cancellation_token.cancel();
        self.notify(LifecycleEvent::Terminated {
            timestamp: SystemTime::now(),
        })
        .await;
    }
}
