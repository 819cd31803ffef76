use super::handle::ControlChannel;
use super::types::{ControlEvent, SimulationState};
use crate::error::ControlError;
use crate::message::ControlMessage;
use tracing::{debug, info};

impl ControlChannel {
    /// Apply one control event to the simulation lifecycle.
    ///
    /// Returns the committed state. A shutdown returns `ShuttingDown`; the
    /// channel moves on to `Terminated` by itself once the drain finishes.
    /// On error nothing changes.
    pub async fn apply(&self, event: ControlEvent) -> Result<SimulationState, ControlError> {
        let kind = event.kind();
        debug!("Applying {} event", kind);

        let mut guarded = match self.lock_state().await {
            Ok(guarded) => guarded,
            Err(e) => return Err(self.reject(self.state(), Some(kind), e).await),
        };

        let from = guarded.current;
        let to = match from.next(kind) {
            Ok(to) => to,
            Err(e) => {
                drop(guarded);
                return Err(self.reject(from, Some(kind), e).await);
            }
        };

        let (parameters, attributes) = event.into_payloads();
        let transition = self
            .commit(&mut guarded, to, Some(kind), parameters, attributes)
            .await;
        drop(guarded);

        self.shared.stats.record_applied();
        info!(
            "Simulation {} -> {} on {} (#{})",
            transition.from, transition.to, kind, transition.sequence
        );

        if to == SimulationState::ShuttingDown {
            self.spawn_drain();
        }

        Ok(to)
    }

    /// Validate a decoded wire message and apply it
    pub async fn apply_message(
        &self,
        message: ControlMessage,
    ) -> Result<SimulationState, ControlError> {
        match message.into_event() {
            Ok(event) => self.apply(event).await,
            Err(e) => Err(self.reject(self.state(), None, e).await),
        }
    }

    /// Decode a JSON control message and apply it
    pub async fn apply_json(&self, input: &str) -> Result<SimulationState, ControlError> {
        match ControlMessage::parse(input) {
            Ok(message) => self.apply_message(message).await,
            Err(e) => Err(self.reject(self.state(), None, e).await),
        }
    }
}
