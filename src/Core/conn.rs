// Generic netlink connection on top of a NetlinkTransport.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use super::attr::{self, Attribute};
use super::message::{
    parse_messages, GenlMessage, NLMSG_DONE, NLMSG_NOOP, NLMSG_OVERRUN,
    NLM_F_REQUEST,
};
use super::socket::{open_transport, NetlinkTransport};
use crate::error::{BridgeError, Result};

/// Receive buffer size. Large enough for any TCMU event or controller reply.
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

// Generic netlink controller (include/uapi/linux/genetlink.h)
pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_NEWFAMILY: u8 = 1;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_VERSION: u8 = 1;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;
pub const CTRL_ATTR_VERSION: u16 = 3;
pub const CTRL_ATTR_MCAST_GROUPS: u16 = 7;
pub const CTRL_ATTR_MCAST_GRP_NAME: u16 = 1;
pub const CTRL_ATTR_MCAST_GRP_ID: u16 = 2;

/// A named multicast group advertised by a family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MulticastGroup {
    pub id: u32,
    pub name: String,
}

/// A generic netlink family as resolved through the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Family {
    pub id: u16,
    pub version: u8,
    pub name: String,
    pub groups: Vec<MulticastGroup>,
}

impl Family {
    /// Looks up a multicast group by name.
    pub fn group(&self, name: &str) -> Option<&MulticastGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Parses a `CTRL_CMD_NEWFAMILY` attribute payload.
    pub fn from_attributes(attrs: &[Attribute]) -> Result<Self> {
        let mut family = Family {
            id: 0,
            version: 0,
            name: String::new(),
            groups: Vec::new(),
        };

        for a in attrs {
            match a.kind {
                CTRL_ATTR_FAMILY_ID => family.id = a.as_u16()?,
                CTRL_ATTR_FAMILY_NAME => family.name = a.as_str()?.to_owned(),
                CTRL_ATTR_VERSION => family.version = a.as_u32()? as u8,
                CTRL_ATTR_MCAST_GROUPS => {
                    for entry in a.nested()? {
                        family.groups.push(parse_group(&entry.nested()?)?);
                    }
                }
                _ => {}
            }
        }

        Ok(family)
    }
}

fn parse_group(attrs: &[Attribute]) -> Result<MulticastGroup> {
    let mut group = MulticastGroup {
        id: 0,
        name: String::new(),
    };
    for a in attrs {
        match a.kind {
            CTRL_ATTR_MCAST_GRP_NAME => group.name = a.as_str()?.to_owned(),
            CTRL_ATTR_MCAST_GRP_ID => group.id = a.as_u32()?,
            _ => {}
        }
    }
    Ok(group)
}

fn initial_sequence() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    nanos.max(1)
}

/// A generic netlink connection.
///
/// All methods take `&self`; the receive buffer sits behind a mutex so one
/// `Conn` can be shared between the dispatcher thread and whoever sends.
pub struct Conn {
    transport: Arc<dyn NetlinkTransport>,
    sequence: AtomicU32,
    recv_buf: Mutex<Vec<u8>>,
}

impl Conn {
    /// Opens a generic netlink socket.
    ///
    /// Fails with `TransportUnavailable` when the host cannot provide one.
    pub fn dial() -> Result<Self> {
        let transport = open_transport().map_err(BridgeError::TransportUnavailable)?;
        Ok(Self::with_transport(transport))
    }

    /// Wraps an already opened transport.
    pub fn with_transport(transport: Arc<dyn NetlinkTransport>) -> Self {
        Self {
            transport,
            sequence: AtomicU32::new(initial_sequence()),
            recv_buf: Mutex::new(vec![0u8; RECV_BUFFER_SIZE]),
        }
    }

    pub fn transport(&self) -> &Arc<dyn NetlinkTransport> {
        &self.transport
    }

    /// Next sequence number that `send` will use.
    pub fn peek_sequence(&self) -> u32 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Sends `msg` to `family`, returning the sequence number used.
    pub fn send(&self, msg: &GenlMessage, family: u16, flags: u16) -> Result<u32> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let bytes = msg.to_bytes(family, flags, sequence, self.transport.local_port());
        self.transport.send(&bytes)?;
        Ok(sequence)
    }

    /// Blocks for the next datagram and returns the generic netlink
    /// messages it carried.
    ///
    /// Acks and no-ops are skipped. A kernel error report becomes
    /// `BridgeError::Kernel`.
    pub fn receive(&self) -> Result<Vec<GenlMessage>> {
        let mut buf = self.recv_buf.lock();
        let n = self.transport.recv(&mut buf)?;
        let raw = parse_messages(&buf[..n])?;
        drop(buf);

        let mut msgs = Vec::with_capacity(raw.len());
        for msg in raw {
            if let Some(code) = msg.error_code() {
                match code? {
                    0 => continue,
                    code => return Err(BridgeError::Kernel { errno: -code }),
                }
            }
            match msg.header.kind {
                NLMSG_NOOP => continue,
                NLMSG_DONE => break,
                NLMSG_OVERRUN => {
                    return Err(BridgeError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "netlink overrun reported by kernel",
                    )))
                }
                _ => msgs.push(GenlMessage::from_netlink(msg)?),
            }
        }
        Ok(msgs)
    }

    pub fn join_group(&self, group: u32) -> io::Result<()> {
        self.transport.join_group(group)
    }

    /// Resolves a family by name through the generic netlink controller.
    ///
    /// A kernel `ENOENT` answer becomes `ChannelNotFound`.
    pub fn get_family(&self, name: &str) -> Result<Family> {
        let data = attr::encode(&[Attribute::string(CTRL_ATTR_FAMILY_NAME, name)])?;
        let req = GenlMessage::new(CTRL_CMD_GETFAMILY, CTRL_VERSION, data);
        let sequence = self.send(&req, GENL_ID_CTRL, NLM_F_REQUEST)?;

        loop {
            let msgs = match self.receive() {
                Ok(msgs) => msgs,
                Err(BridgeError::Kernel { errno }) if errno == libc::ENOENT => {
                    return Err(BridgeError::ChannelNotFound {
                        name: name.to_owned(),
                    })
                }
                Err(e) => return Err(e),
            };

            for msg in msgs {
                if msg.netlink.sequence != sequence || msg.header.command != CTRL_CMD_NEWFAMILY {
                    log::debug!(
                        "ignoring controller message seq={} cmd={} while resolving {}",
                        msg.netlink.sequence,
                        msg.header.command,
                        name
                    );
                    continue;
                }
                return Family::from_attributes(&attr::decode(&msg.data)?);
            }
        }
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_conn(self, f)
    }
}
