use std::sync::Arc;

use crate::Core::conn::{Conn, Family};

/// Whether the kernel side accepts `*_DONE` replies.
///
/// Fixed once at startup from the family version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Version >= 2 and `SET_FEATURES` was sent; replies carry the
    /// capability flag.
    Enabled,
    /// Older kernel, or negotiation failed and the builder was told to
    /// fall back. Replies never carry the capability flag.
    Disabled,
}

impl NegotiationState {
    pub fn is_enabled(self) -> bool {
        self == NegotiationState::Enabled
    }
}

/// A live, negotiated TCM-USER channel.
///
/// Immutable after negotiation; clone it freely (the connection is shared).
#[derive(Clone)]
pub struct Channel {
    pub(crate) conn: Arc<Conn>,
    pub(crate) family: Family,
    pub(crate) group_id: u32,
    pub(crate) negotiation: NegotiationState,
}

impl Channel {
    pub(crate) fn new(
        conn: Arc<Conn>,
        family: Family,
        group_id: u32,
        negotiation: NegotiationState,
    ) -> Self {
        Self {
            conn,
            family,
            group_id,
            negotiation,
        }
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    /// Numeric family id assigned by the kernel.
    pub fn id(&self) -> u16 {
        self.family.id
    }

    /// Protocol version the family advertised.
    pub fn version(&self) -> u8 {
        self.family.version
    }

    /// Id of the joined multicast group.
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn negotiation(&self) -> NegotiationState {
        self.negotiation
    }

    pub fn conn(&self) -> &Arc<Conn> {
        &self.conn
    }
}
