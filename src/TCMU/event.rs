// Typed view of one kernel -> user device lifecycle message.

use std::fmt;

use super::consts::{TcmuAttr, TcmuCmd};
use crate::error::{BridgeError, Result};
use crate::Core::attr::{self, Attribute, DecodeError};
use crate::Core::message::GenlMessage;

/// Opaque 4-byte device identifier, copied verbatim from event to reply.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 4]);

impl DeviceId {
    /// Builds an id from a kernel `u32` (native endian on the wire).
    pub fn from_u32(v: u32) -> Self {
        Self(v.to_ne_bytes())
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_ne_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    fn from_attribute(a: &Attribute) -> std::result::Result<Self, DecodeError> {
        let bytes: [u8; 4] = a
            .data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::BadPayloadSize {
                kind: a.kind,
                expected: 4,
                actual: a.data.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.as_u32())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// The three lifecycle events the kernel announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
    Reconfigured,
}

impl EventKind {
    pub fn from_command(command: u8) -> Option<Self> {
        match TcmuCmd::from_u8(command)? {
            TcmuCmd::AddedDevice => Some(Self::Added),
            TcmuCmd::RemovedDevice => Some(Self::Removed),
            TcmuCmd::ReconfigDevice => Some(Self::Reconfigured),
            _ => None,
        }
    }

    pub fn command(self) -> TcmuCmd {
        match self {
            Self::Added => TcmuCmd::AddedDevice,
            Self::Removed => TcmuCmd::RemovedDevice,
            Self::Reconfigured => TcmuCmd::ReconfigDevice,
        }
    }

    /// Command that acknowledges this event.
    pub fn done_command(self) -> TcmuCmd {
        match self {
            Self::Added => TcmuCmd::AddedDeviceDone,
            Self::Removed => TcmuCmd::RemovedDeviceDone,
            Self::Reconfigured => TcmuCmd::ReconfigDeviceDone,
        }
    }
}

/// A decoded lifecycle event.
///
/// Only `kind` and `device_id` drive the acknowledgment. The remaining
/// fields are whatever descriptive attributes the kernel attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub kind: EventKind,
    pub device_id: DeviceId,
    /// `TCMU_ATTR_DEVICE`, e.g. `"user/foo"`.
    pub name: Option<String>,
    /// `TCMU_ATTR_MINOR`, the uio minor number.
    pub minor: Option<u32>,
    /// `TCMU_ATTR_DEV_CFG`, the handler config string.
    pub config: Option<String>,
    /// `TCMU_ATTR_DEV_SIZE`, in bytes.
    pub size: Option<u64>,
    /// `TCMU_ATTR_WRITECACHE`
    pub write_cache: Option<bool>,
}

impl DeviceEvent {
    /// Decodes an event message.
    ///
    /// # Errors
    /// * `UnexpectedCommand` if the command is not one of the three events
    /// * `Decode` on malformed framing or a DEVICE_ID that is not 4 bytes
    /// * `MissingDeviceId` if the message carries no DEVICE_ID
    pub fn decode(msg: &GenlMessage) -> Result<Self> {
        let command = msg.header.command;
        let kind =
            EventKind::from_command(command).ok_or(BridgeError::UnexpectedCommand(command))?;
        let attrs = attr::decode(&msg.data)?;
        Self::from_attributes(kind, &attrs)
    }

    pub fn from_attributes(kind: EventKind, attrs: &[Attribute]) -> Result<Self> {
        let device_id = attr::find(attrs, TcmuAttr::DeviceId.code())
            .ok_or(BridgeError::MissingDeviceId {
                command: kind.command().code(),
            })
            .and_then(|a| DeviceId::from_attribute(a).map_err(BridgeError::from))?;

        let mut event = DeviceEvent {
            kind,
            device_id,
            name: None,
            minor: None,
            config: None,
            size: None,
            write_cache: None,
        };

        for a in attrs {
            let parsed = match TcmuAttr::from_u16(a.kind) {
                Some(TcmuAttr::Device) => a.as_str().map(|s| event.name = Some(s.to_owned())),
                Some(TcmuAttr::Minor) => a.as_u32().map(|v| event.minor = Some(v)),
                Some(TcmuAttr::DevConfig) => a.as_str().map(|s| event.config = Some(s.to_owned())),
                Some(TcmuAttr::DevSize) => a.as_uint().map(|v| event.size = Some(v)),
                Some(TcmuAttr::WriteCache) => a.as_u8().map(|v| event.write_cache = Some(v != 0)),
                _ => Ok(()),
            };
            if let Err(e) = parsed {
                log::warn!("device {}: ignoring malformed attribute: {}", device_id, e);
            }
        }

        Ok(event)
    }
}
