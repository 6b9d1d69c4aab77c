mod builder;
mod channel;
mod debug;
mod dispatcher;
mod reply;

pub mod consts;
pub mod event;

pub use builder::{set_features_message, BridgeBuilder};
pub use channel::{Channel, NegotiationState};
pub use consts::{TcmuAttr, TcmuCmd, CHANNEL_NAME, GROUP_NAME, REPLY_CAPABLE_VERSION};
pub use dispatcher::{
    AcknowledgeAll, DeviceHandler, DispatchSnapshot, DispatchStats, Dispatcher, Outcome,
    ShutdownHandle,
};
pub use event::{DeviceEvent, DeviceId, EventKind};
pub use reply::{reply_attributes, reply_message};
