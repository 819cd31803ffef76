use crate::error::ControlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key/value payload carried by a control event
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Simulation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationState {
    Stopped,
    Running,
    Paused,
    ShuttingDown,
    Terminated,
}

impl SimulationState {
    /// Compute the state an event leads to without committing it.
    ///
    /// Shutdown lands on `ShuttingDown`; the drain completion step to
    /// `Terminated` is not driven by an event.
    pub fn next(self, kind: ControlKind) -> Result<SimulationState, ControlError> {
        use ControlKind::*;
        use SimulationState::*;

        match (self, kind) {
            (Terminated, _) => Err(ControlError::AlreadyTerminated),
            (Stopped, Start) => Ok(Running),
            (Running, Pause) => Ok(Paused),
            (Paused, Start) => Ok(Running),
            (Running | Paused, Shutdown) => Ok(ShuttingDown),
            (state, event) => Err(ControlError::InvalidTransition { state, event }),
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SimulationState::Terminated
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimulationState::Stopped => "stopped",
            SimulationState::Running => "running",
            SimulationState::Paused => "paused",
            SimulationState::ShuttingDown => "shutting_down",
            SimulationState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SimulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of control request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Start,
    Pause,
    Shutdown,
}

impl ControlKind {
    pub const ALL: [ControlKind; 3] = [
        ControlKind::Start,
        ControlKind::Pause,
        ControlKind::Shutdown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Start => "start",
            ControlKind::Pause => "pause",
            ControlKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A control request from an external sender, consumed by `apply`
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    kind: ControlKind,
    parameters: Option<Payload>,
    attributes: Option<Payload>,
}

impl ControlEvent {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            parameters: None,
            attributes: None,
        }
    }

    pub fn start() -> Self {
        Self::new(ControlKind::Start)
    }

    pub fn pause() -> Self {
        Self::new(ControlKind::Pause)
    }

    pub fn shutdown() -> Self {
        Self::new(ControlKind::Shutdown)
    }

    pub fn with_parameters(mut self, parameters: Payload) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_attributes(mut self, attributes: Payload) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn parameters(&self) -> Option<&Payload> {
        self.parameters.as_ref()
    }

    pub fn attributes(&self) -> Option<&Payload> {
        self.attributes.as_ref()
    }

    pub(crate) fn into_payloads(self) -> (Option<Payload>, Option<Payload>) {
        (self.parameters, self.attributes)
    }
}

/// A committed state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Position in the channel's commit order, starting at 1
    pub sequence: u64,
    pub from: SimulationState,
    pub to: SimulationState,
    /// `None` for the drain completion step
    pub trigger: Option<ControlKind>,
    pub at: DateTime<Utc>,
}
