// Netlink attribute (nlattr) TLV codec.
//
// Layout of one attribute, native endian:
//   [len: u16][type: u16][payload ...][pad to 4 bytes]
// `len` counts the 4-byte header plus the payload, never the padding.

use std::fmt;

/// Size of the `nlattr` header.
pub const NLA_HDRLEN: usize = 4;

/// Alignment of every attribute inside a message.
pub const NLA_ALIGNTO: usize = 4;

/// Largest payload a single attribute can carry.
pub const NLA_MAX_PAYLOAD: usize = u16::MAX as usize - NLA_HDRLEN;

pub const NLA_F_NESTED: u16 = 1 << 15;
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("attribute {kind} payload too large ({len} > {NLA_MAX_PAYLOAD})")]
    PayloadTooLarge { kind: u16, len: usize },

    #[error("attribute type {0:#06x} overlaps the nla flag bits")]
    InvalidType(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated attribute header at offset {offset} ({remaining} bytes left)")]
    TruncatedHeader { offset: usize, remaining: usize },

    #[error("attribute at offset {offset} declares invalid length {len}")]
    InvalidLength { offset: usize, len: usize },

    #[error("attribute at offset {offset} declares {len} bytes but only {remaining} remain")]
    Overrun {
        offset: usize,
        len: usize,
        remaining: usize,
    },

    #[error("attribute {kind} expected {expected} bytes, got {actual}")]
    BadPayloadSize {
        kind: u16,
        expected: usize,
        actual: usize,
    },

    #[error("attribute {kind} is not valid UTF-8")]
    InvalidString { kind: u16 },

    #[error("truncated {what} header ({len} bytes)")]
    TruncatedMessage { what: &'static str, len: usize },
}

/// One typed key/value unit of a netlink payload.
///
/// `kind` never carries the `NLA_F_*` flag bits after decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct Attribute {
    pub kind: u16,
    pub data: Vec<u8>,
}

impl Attribute {
    pub fn new(kind: u16, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn u8(kind: u16, value: u8) -> Self {
        Self::new(kind, vec![value])
    }

    pub fn u16(kind: u16, value: u16) -> Self {
        Self::new(kind, value.to_ne_bytes().to_vec())
    }

    pub fn u32(kind: u16, value: u32) -> Self {
        Self::new(kind, value.to_ne_bytes().to_vec())
    }

    pub fn i32(kind: u16, value: i32) -> Self {
        Self::new(kind, value.to_ne_bytes().to_vec())
    }

    pub fn u64(kind: u16, value: u64) -> Self {
        Self::new(kind, value.to_ne_bytes().to_vec())
    }

    /// String attribute, NUL-terminated the way the kernel's `NLA_NUL_STRING`
    /// policy expects.
    pub fn string(kind: u16, value: &str) -> Self {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        Self::new(kind, data)
    }

    /// Single-byte capability flag asserting support.
    pub fn flag(kind: u16) -> Self {
        Self::u8(kind, 1)
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], DecodeError> {
        self.data
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::BadPayloadSize {
                kind: self.kind,
                expected: N,
                actual: self.data.len(),
            })
    }

    pub fn as_u8(&self) -> Result<u8, DecodeError> {
        self.fixed::<1>().map(|b| b[0])
    }

    pub fn as_u16(&self) -> Result<u16, DecodeError> {
        self.fixed::<2>().map(u16::from_ne_bytes)
    }

    pub fn as_u32(&self) -> Result<u32, DecodeError> {
        self.fixed::<4>().map(u32::from_ne_bytes)
    }

    pub fn as_i32(&self) -> Result<i32, DecodeError> {
        self.fixed::<4>().map(i32::from_ne_bytes)
    }

    /// Reads a 4 or 8 byte unsigned integer.
    pub fn as_uint(&self) -> Result<u64, DecodeError> {
        match self.data.len() {
            4 => self.as_u32().map(u64::from),
            _ => self.fixed::<8>().map(u64::from_ne_bytes),
        }
    }

    /// Reads a string, dropping everything from the first NUL onward.
    pub fn as_str(&self) -> Result<&str, DecodeError> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[..end])
            .map_err(|_| DecodeError::InvalidString { kind: self.kind })
    }

    /// Decodes the payload as a nested attribute list.
    pub fn nested(&self) -> Result<Vec<Attribute>, DecodeError> {
        decode(&self.data)
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .field("data", &format_args!("{:02x?}", self.data))
            .finish()
    }
}

/// Number of bytes `attrs` occupies once encoded.
pub fn encoded_len(attrs: &[Attribute]) -> usize {
    attrs
        .iter()
        .map(|a| nla_align(NLA_HDRLEN + a.data.len()))
        .sum()
}

/// Appends the encoded form of `attrs` to `out`.
pub fn encode_into(attrs: &[Attribute], out: &mut Vec<u8>) -> Result<(), EncodeError> {
    out.reserve(encoded_len(attrs));
    for attr in attrs {
        if attr.kind & !NLA_TYPE_MASK != 0 {
            return Err(EncodeError::InvalidType(attr.kind));
        }
        if attr.data.len() > NLA_MAX_PAYLOAD {
            return Err(EncodeError::PayloadTooLarge {
                kind: attr.kind,
                len: attr.data.len(),
            });
        }

        let len = NLA_HDRLEN + attr.data.len();
        out.extend_from_slice(&(len as u16).to_ne_bytes());
        out.extend_from_slice(&attr.kind.to_ne_bytes());
        out.extend_from_slice(&attr.data);
        out.resize(out.len() + nla_align(len) - len, 0);
    }
    Ok(())
}

/// Encodes an ordered attribute list.
pub fn encode(attrs: &[Attribute]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    encode_into(attrs, &mut out)?;
    Ok(out)
}

/// Decodes an attribute list, preserving order and unknown type codes.
///
/// The final attribute may omit its trailing padding.
pub fn decode(buf: &[u8]) -> Result<Vec<Attribute>, DecodeError> {
    let mut attrs = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let remaining = buf.len() - offset;
        if remaining < NLA_HDRLEN {
            return Err(DecodeError::TruncatedHeader { offset, remaining });
        }

        let len = u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as usize;
        let kind = u16::from_ne_bytes([buf[offset + 2], buf[offset + 3]]);

        if len < NLA_HDRLEN {
            return Err(DecodeError::InvalidLength { offset, len });
        }
        if len > remaining {
            return Err(DecodeError::Overrun {
                offset,
                len,
                remaining,
            });
        }

        attrs.push(Attribute {
            kind: kind & NLA_TYPE_MASK,
            data: buf[offset + NLA_HDRLEN..offset + len].to_vec(),
        });

        offset += nla_align(len).min(remaining);
    }

    Ok(attrs)
}

/// Returns the first attribute of type `kind`.
pub fn find(attrs: &[Attribute], kind: u16) -> Option<&Attribute> {
    attrs.iter().find(|a| a.kind == kind)
}
