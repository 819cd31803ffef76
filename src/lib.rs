pub mod channel;
pub mod config;
pub mod drain;
pub mod driver;
pub mod error;
pub mod events;
pub mod message;

pub use channel::{
    ChannelStats, ChannelStatsSnapshot, ControlChannel, ControlChannelBuilder, ControlEvent,
    ControlKind, Payload, SimulationState, Transition,
};
pub use config::SimctlConfig;
pub use drain::{DelayDrainer, Drainer, NoopDrainer};
pub use driver::{Driver, ShutdownReason};
pub use error::{ControlError, DrainError, EventBusError, Result, SimctlError};
pub use events::{EventBus, EventFilter, EventReceiver, LifecycleEvent};
pub use message::{ControlMessage, ControlReply, ReplyError};
