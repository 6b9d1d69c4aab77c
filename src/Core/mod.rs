pub mod attr;
pub mod conn;
pub mod message;
pub mod socket;

pub use attr::{Attribute, DecodeError, EncodeError};
pub use conn::{Conn, Family, MulticastGroup};
pub use message::{GenlHeader, GenlMessage, NetlinkHeader};
pub use socket::{open_transport, NetlinkTransport};
