mod apply;
mod builder;
mod handle;
mod shutdown;
mod stats;
mod types;


pub use builder::ControlChannelBuilder;
pub use handle::ControlChannel;
pub use stats::{ChannelStats, ChannelStatsSnapshot};
pub use types::{ControlEvent, ControlKind, Payload, SimulationState, Transition};
