use std::fmt;
use crate::Core::conn::Conn;
use crate::TCMU::{Channel, Dispatcher};

/// Debug function for Conn
///
/// Shows the transport (whatever its own Debug prints) and the next
/// sequence number, never the receive buffer contents.
pub fn debug_conn(conn: &Conn, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Conn")
        .field("transport", conn.transport())
        .field("local_port", &conn.transport().local_port())
        .field("next_sequence", &conn.peek_sequence())
        .finish_non_exhaustive()
}

/// Debug function for Channel
///
/// Shows:
/// - Family name, id and version
/// - Joined group id
/// - Negotiation state
pub fn debug_channel(channel: &Channel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
        .field("name", &channel.family().name)
        .field("id", &channel.id())
        .field("version", &channel.version())
        .field("group_id", &channel.group_id())
        .field("negotiation", &channel.negotiation())
        .finish()
}

/// Debug function for Dispatcher
pub fn debug_dispatcher(dispatcher: &Dispatcher, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Dispatcher")
        .field("channel", dispatcher.channel())
        .field("handler", &"<opaque>")
        .field("stats", &dispatcher.stats().snapshot())
        .finish()
}
