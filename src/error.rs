use crate::channel::{ControlKind, SimulationState};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimctlError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),

    #[error("System error: {message}")]
    System { message: String },
}

impl SimctlError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Rejection returned to the caller of `ControlChannel::apply`.
///
/// None of these are fatal to the channel; it keeps accepting events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Cannot apply {event} while simulation is {state}")]
    InvalidTransition {
        state: SimulationState,
        event: ControlKind,
    },

    #[error("Simulation has already terminated")]
    AlreadyTerminated,

    #[error("Malformed control event: {reason}")]
    MalformedEvent { reason: String },

    #[error("Control channel busy, lock not acquired within {waited:?}")]
    Busy { waited: Duration },
}

impl ControlError {
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Stable snake_case identifier used in outbound replies
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::InvalidTransition { .. } => "invalid_transition",
            ControlError::AlreadyTerminated => "already_terminated",
            ControlError::MalformedEvent { .. } => "malformed_event",
            ControlError::Busy { .. } => "busy",
        }
    }
}

/// Failure reported by a `Drainer` while the simulation winds down
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrainError {
    #[error("Drain failed: {message}")]
    Failed { message: String },
}

impl DrainError {
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Lifecycle event bus failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Failed to publish lifecycle event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SimctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_names_state_and_event() {
        let err = ControlError::InvalidTransition {
            state: SimulationState::Stopped,
            event: ControlKind::Pause,
        };

        let message = err.to_string();
        assert!(message.contains("stopped"));
        assert!(message.contains("pause"));
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ControlError::AlreadyTerminated.kind(), "already_terminated");
        assert_eq!(ControlError::malformed("bad").kind(), "malformed_event");
        assert_eq!(
            ControlError::Busy {
                waited: Duration::from_millis(5)
            }
            .kind(),
            "busy"
        );
    }

    #[test]
    fn test_control_error_converts_into_crate_error() {
        let err: SimctlError = ControlError::AlreadyTerminated.into();
        assert!(matches!(err, SimctlError::Control(_)));
    }
}
