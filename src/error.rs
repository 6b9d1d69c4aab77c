// Error taxonomy for the TCM-USER bridge.

use std::io;

use crate::Core::attr::{DecodeError, EncodeError};

/// Everything that can go wrong between dialing the kernel and sending an
/// acknowledgment.
///
/// Startup failures (`TransportUnavailable`, `ChannelNotFound`,
/// `GroupNotFound`, `JoinFailed`) keep the bridge from starting at all.
/// The remaining variants are per-message and are logged by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("generic netlink transport unavailable: {0}")]
    TransportUnavailable(#[source] io::Error),

    #[error("netlink family {name:?} not found (is the target_core_user module loaded?)")]
    ChannelNotFound { name: String },

    #[error("multicast group {group:?} not advertised by family {family:?}")]
    GroupNotFound { family: String, group: String },

    #[error("failed to join multicast group {group_id}: {source}")]
    JoinFailed {
        group_id: u32,
        #[source]
        source: io::Error,
    },

    #[error("capability negotiation failed: {0}")]
    NegotiationFailed(#[source] Box<BridgeError>),

    #[error("attribute encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("attribute decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("kernel returned error {errno} ({})", os_error(.errno))]
    Kernel { errno: i32 },

    #[error("event command {command} carries no device id attribute")]
    MissingDeviceId { command: u8 },

    #[error("unexpected command {0}")]
    UnexpectedCommand(u8),

    #[error("expected exactly one message per delivery, got {0}")]
    UnexpectedBatch(usize),

    #[error("message addressed to family {got}, channel is family {expected}")]
    WrongFamily { expected: u16, got: u16 },

    #[error("netlink I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Returns true for the failures that must stop the bridge at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::TransportUnavailable(_)
                | BridgeError::ChannelNotFound { .. }
                | BridgeError::GroupNotFound { .. }
                | BridgeError::JoinFailed { .. }
        )
    }

    /// Returns true when the error was produced by an interrupted receive,
    /// i.e. someone asked the transport to wake up.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, BridgeError::Io(e) if e.kind() == io::ErrorKind::Interrupted)
    }
}

fn os_error(errno: &i32) -> io::Error {
    io::Error::from_raw_os_error(*errno)
}

pub type Result<T> = std::result::Result<T, BridgeError>;
