use super::handle::ControlChannel;
use crate::config::SimctlConfig;
use crate::drain::{Drainer, NoopDrainer};
use crate::error::Result;
use crate::events::EventBus;
use std::sync::Arc;

/// Builder for a control channel
pub struct ControlChannelBuilder {
    config: Option<SimctlConfig>,
    drainer: Option<Arc<dyn Drainer>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ControlChannelBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            drainer: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: SimctlConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn drainer<D: Drainer + 'static>(mut self, drainer: D) -> Self {
        self.drainer = Some(Arc::new(drainer));
        self
    }

    pub fn shared_drainer(mut self, drainer: Arc<dyn Drainer>) -> Self {
        self.drainer = Some(drainer);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Build the channel; unset parts fall back to defaults and a no-op drain
    pub fn build(self) -> Result<ControlChannel> {
        let config = self.config.unwrap_or_default();
        let drainer = self.drainer.unwrap_or_else(|| Arc::new(NoopDrainer));

        match self.event_bus {
            Some(event_bus) => ControlChannel::with_event_bus(config, drainer, event_bus),
            None => ControlChannel::new(config, drainer),
        }
    }
}

impl Default for ControlChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}
