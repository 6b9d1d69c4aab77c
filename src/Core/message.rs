// Netlink and generic netlink message framing.

use super::attr::DecodeError;

/// Size of `struct nlmsghdr`.
pub const NLMSG_HDRLEN: usize = 16;

/// Size of `struct genlmsghdr`.
pub const GENL_HDRLEN: usize = 4;

pub const NLMSG_ALIGNTO: usize = 4;

// Reserved message types (include/uapi/linux/netlink.h)
pub const NLMSG_NOOP: u16 = 0x1;
pub const NLMSG_ERROR: u16 = 0x2;
pub const NLMSG_DONE: u16 = 0x3;
pub const NLMSG_OVERRUN: u16 = 0x4;

// Header flag
pub const NLM_F_REQUEST: u16 = 0x01;

#[inline]
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// `struct nlmsghdr`. ABI-stable; all fields are native endian.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NetlinkHeader {
    pub length: u32,
    pub kind: u16,
    pub flags: u16,
    pub sequence: u32,
    pub pid: u32,
}

impl NetlinkHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.length.to_ne_bytes());
        out.extend_from_slice(&self.kind.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
        out.extend_from_slice(&self.sequence.to_ne_bytes());
        out.extend_from_slice(&self.pid.to_ne_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < NLMSG_HDRLEN {
            return Err(DecodeError::TruncatedMessage {
                what: "nlmsghdr",
                len: buf.len(),
            });
        }
        Ok(Self {
            length: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kind: u16::from_ne_bytes([buf[4], buf[5]]),
            flags: u16::from_ne_bytes([buf[6], buf[7]]),
            sequence: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            pid: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }
}

/// `struct genlmsghdr`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GenlHeader {
    pub command: u8,
    pub version: u8,
    pub reserved: u16,
}

impl GenlHeader {
    pub fn new(command: u8, version: u8) -> Self {
        Self {
            command,
            version,
            reserved: 0,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.command);
        out.push(self.version);
        out.extend_from_slice(&self.reserved.to_ne_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < GENL_HDRLEN {
            return Err(DecodeError::TruncatedMessage {
                what: "genlmsghdr",
                len: buf.len(),
            });
        }
        Ok(Self {
            command: buf[0],
            version: buf[1],
            reserved: u16::from_ne_bytes([buf[2], buf[3]]),
        })
    }
}

/// One raw netlink message: header plus everything after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetlinkMessage {
    pub header: NetlinkHeader,
    pub payload: Vec<u8>,
}

impl NetlinkMessage {
    /// For `NLMSG_ERROR` messages, the errno carried in the payload
    /// (0 for a plain ack, negative on failure).
    pub fn error_code(&self) -> Option<Result<i32, DecodeError>> {
        if self.header.kind != NLMSG_ERROR {
            return None;
        }
        Some(if self.payload.len() < 4 {
            Err(DecodeError::TruncatedMessage {
                what: "nlmsgerr",
                len: self.payload.len(),
            })
        } else {
            Ok(i32::from_ne_bytes([
                self.payload[0],
                self.payload[1],
                self.payload[2],
                self.payload[3],
            ]))
        })
    }
}

/// A generic netlink message as seen by callers: the family-level header
/// plus its still-encoded attribute payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenlMessage {
    pub header: GenlHeader,
    pub data: Vec<u8>,
    /// Netlink header the message arrived with. Ignored on send.
    pub netlink: NetlinkHeader,
}

impl GenlMessage {
    pub fn new(command: u8, version: u8, data: Vec<u8>) -> Self {
        Self {
            header: GenlHeader::new(command, version),
            data,
            netlink: NetlinkHeader::default(),
        }
    }

    /// Serializes into a complete netlink datagram addressed to `family`.
    pub fn to_bytes(&self, family: u16, flags: u16, sequence: u32, pid: u32) -> Vec<u8> {
        let length = NLMSG_HDRLEN + GENL_HDRLEN + self.data.len();
        let mut out = Vec::with_capacity(nlmsg_align(length));
        NetlinkHeader {
            length: length as u32,
            kind: family,
            flags,
            sequence,
            pid,
        }
        .write_to(&mut out);
        self.header.write_to(&mut out);
        out.extend_from_slice(&self.data);
        out.resize(nlmsg_align(length), 0);
        out
    }

    pub fn from_netlink(msg: NetlinkMessage) -> Result<Self, DecodeError> {
        let header = GenlHeader::read_from(&msg.payload)?;
        Ok(Self {
            header,
            data: msg.payload[GENL_HDRLEN..].to_vec(),
            netlink: msg.header,
        })
    }
}

/// Splits one received datagram into its netlink messages.
pub fn parse_messages(buf: &[u8]) -> Result<Vec<NetlinkMessage>, DecodeError> {
    let mut msgs = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let header = NetlinkHeader::read_from(&buf[offset..])?;
        let len = header.length as usize;
        let remaining = buf.len() - offset;
        if len < NLMSG_HDRLEN {
            return Err(DecodeError::InvalidLength { offset, len });
        }
        if len > remaining {
            return Err(DecodeError::Overrun {
                offset,
                len,
                remaining,
            });
        }

        msgs.push(NetlinkMessage {
            header,
            payload: buf[offset + NLMSG_HDRLEN..offset + len].to_vec(),
        });
        offset += nlmsg_align(len).min(remaining);
    }

    Ok(msgs)
}
