use super::stats::{ChannelStats, ChannelStatsSnapshot};
use super::types::{ControlKind, Payload, SimulationState, Transition};
use crate::config::SimctlConfig;
use crate::drain::Drainer;
use crate::error::{ControlError, Result};
use crate::events::{EventBus, LifecycleEvent};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State guarded by the channel lock
#[derive(Debug)]
pub(crate) struct Guarded {
    pub(super) current: SimulationState,
    pub(super) sequence: u64,
}

pub(super) struct Shared {
    pub(super) id: Uuid,
    pub(super) config: SimctlConfig,
    pub(super) guarded: Mutex<Guarded>,
    pub(super) state_tx: watch::Sender<SimulationState>,
    pub(super) history: parking_lot::Mutex<VecDeque<Transition>>,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) drainer: Arc<dyn Drainer>,
    pub(super) stats: ChannelStats,
    pub(super) cancellation_token: CancellationToken,
}

/// Serializes control events against a single simulation lifecycle.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct ControlChannel {
    pub(super) shared: Arc<Shared>,
}

impl ControlChannel {
    /// Create a channel in the `Stopped` state
    pub fn new(config: SimctlConfig, drainer: Arc<dyn Drainer>) -> Result<Self> {
        // The bus capacity must be checked before the broadcast channel exists
        config.validate()?;

        let event_bus = Arc::new(if config.events.debug_logging {
            EventBus::with_debug_logging(config.events.bus_capacity)
        } else {
            EventBus::new(config.events.bus_capacity)
        });
        Self::with_event_bus(config, drainer, event_bus)
    }

    /// Create a channel publishing onto an existing event bus
    pub fn with_event_bus(
        config: SimctlConfig,
        drainer: Arc<dyn Drainer>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        let id = Uuid::new_v4();
        let (state_tx, _) = watch::channel(SimulationState::Stopped);
        let history_capacity = config.channel.history_capacity;

        info!(
            "Control channel {} created (drainer: {}, lock timeout: {:?})",
            id,
            drainer.name(),
            config.channel.lock_timeout()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                config,
                guarded: Mutex::new(Guarded {
                    current: SimulationState::Stopped,
                    sequence: 0,
                }),
                state_tx,
                history: parking_lot::Mutex::new(VecDeque::with_capacity(history_capacity)),
                event_bus,
                drainer,
                stats: ChannelStats::new(),
                cancellation_token: CancellationToken::new(),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Most recently committed state
    pub fn state(&self) -> SimulationState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_terminated(&self) -> bool {
        self.state().is_terminal()
    }

    /// Watch committed states as they change
    pub fn subscribe_state(&self) -> watch::Receiver<SimulationState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the simulation reaches `Terminated`
    pub async fn wait_terminated(&self) {
        let mut receiver = self.shared.state_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once terminal
        let _ = receiver.wait_for(|state| state.is_terminal()).await;
    }

    /// Recent committed transitions, oldest first
    pub fn history(&self) -> Vec<Transition> {
        self.shared.history.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> ChannelStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.shared.event_bus)
    }

    /// Token cancelled once the simulation has terminated
    pub fn termination_token(&self) -> CancellationToken {
        self.shared.cancellation_token.child_token()
    }

    pub fn config(&self) -> &SimctlConfig {
        &self.shared.config
    }

    /// Acquire the state lock, giving up after the configured timeout
    pub(super) async fn lock_state(
        &self,
    ) -> std::result::Result<MutexGuard<'_, Guarded>, ControlError> {
        let waited = self.shared.config.channel.lock_timeout();
        tokio::time::timeout(waited, self.shared.guarded.lock())
            .await
            .map_err(|_| ControlError::Busy { waited })
    }

    /// Commit a transition. Must be called with the state lock held.
    pub(super) async fn commit(
        &self,
        guarded: &mut Guarded,
        to: SimulationState,
        trigger: Option<ControlKind>,
        parameters: Option<Payload>,
        attributes: Option<Payload>,
    ) -> Transition {
        guarded.sequence += 1;
        let transition = Transition {
            sequence: guarded.sequence,
            from: guarded.current,
            to,
            trigger,
            at: Utc::now(),
        };
        guarded.current = to;
        self.shared.state_tx.send_replace(to);

        {
            let mut history = self.shared.history.lock();
            history.push_back(transition.clone());
            while history.len() > self.shared.config.channel.history_capacity {
                history.pop_front();
            }
        }

        // Published under the lock so event order matches commit order
        self.notify(LifecycleEvent::Transitioned {
            transition: transition.clone(),
            parameters,
            attributes,
        })
        .await;

        transition
    }

    /// Record and announce a refused event
    pub(super) async fn reject(
        &self,
        state: SimulationState,
        kind: Option<ControlKind>,
        error: ControlError,
    ) -> ControlError {
        match &error {
            ControlError::MalformedEvent { .. } => self.shared.stats.record_malformed(),
            _ => self.shared.stats.record_rejected(),
        }
        warn!("Control event rejected in state {}: {}", state, error);

        self.notify(LifecycleEvent::Rejected {
            state,
            kind,
            reason: error.to_string(),
            timestamp: SystemTime::now(),
        })
        .await;

        error
    }

    /// Publish a lifecycle event; a bus without subscribers is not an error
    pub(super) async fn notify(&self, event: LifecycleEvent) {
        if let Err(e) = self.shared.event_bus.publish(event).await {
            debug!("Lifecycle event not delivered: {}", e);
        }
    }

    /// Hold the state lock with no timeout, for tests that need a busy channel
    #[cfg(test)]
    pub(crate) async fn hold_lock(&self) -> MutexGuard<'_, Guarded> {
        self.shared.guarded.lock().await
    }
}

impl std::fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlChannel")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}
