// In src/TCMU/builder.rs
use std::sync::Arc;

use super::channel::{Channel, NegotiationState};
use super::consts::{TcmuAttr, TcmuCmd, CHANNEL_NAME, GROUP_NAME, REPLY_CAPABLE_VERSION};
use crate::error::{BridgeError, Result};
use crate::Core::attr::{self, Attribute};
use crate::Core::conn::{Conn, Family};
use crate::Core::message::{GenlMessage, NLM_F_REQUEST};
use crate::Core::socket::NetlinkTransport;

/// Resolves, joins and negotiates a TCM-USER channel.
///
/// ```rust,ignore
/// let channel = BridgeBuilder::new().open()?;
/// let dispatcher = Dispatcher::new(channel);
/// dispatcher.run()?;
/// ```
pub struct BridgeBuilder {
    channel_name: String,
    group_name: String,
    transport: Option<Arc<dyn NetlinkTransport>>,
    degraded_fallback: bool,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            channel_name: CHANNEL_NAME.to_owned(),
            group_name: GROUP_NAME.to_owned(),
            transport: None, // dial a real socket
            degraded_fallback: false,
        }
    }
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    /// Use an already opened transport instead of dialing one.
    pub fn with_transport(mut self, transport: Arc<dyn NetlinkTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// When set, a failed `SET_FEATURES` send is logged and the channel is
    /// returned with [`NegotiationState::Disabled`] instead of failing
    /// with `NegotiationFailed`.
    pub fn with_degraded_fallback(mut self, enabled: bool) -> Self {
        self.degraded_fallback = enabled;
        self
    }

    /// Dials the transport, resolves the family and group, joins the group
    /// and negotiates reply support.
    ///
    /// The group is joined on every version, v1 included; only
    /// `SET_FEATURES` is skipped below version 2.
    ///
    /// # Returns
    /// * `Ok(channel)` ready for a [`Dispatcher`](super::Dispatcher)
    /// * `Err(TransportUnavailable | ChannelNotFound | GroupNotFound | JoinFailed)`
    ///   when the bridge cannot start on this host
    /// * `Err(NegotiationFailed)` when `SET_FEATURES` could not be sent
    pub fn open(self) -> Result<Channel> {
        let conn = match self.transport {
            Some(transport) => Conn::with_transport(transport),
            None => Conn::dial()?,
        };

        let family = conn.get_family(&self.channel_name)?;
        let group_id = family
            .group(&self.group_name)
            .map(|g| g.id)
            .ok_or_else(|| BridgeError::GroupNotFound {
                family: family.name.clone(),
                group: self.group_name.clone(),
            })?;

        // Joined unconditionally: v1 kernels still multicast events.
        conn.join_group(group_id)
            .map_err(|source| BridgeError::JoinFailed { group_id, source })?;

        log::info!(
            "joined {}/{} (family {}, group {}, version {})",
            family.name,
            self.group_name,
            family.id,
            group_id,
            family.version
        );

        let conn = Arc::new(conn);

        if family.version < REPLY_CAPABLE_VERSION {
            log::info!(
                "family version {} predates reply support, skipping SET_FEATURES",
                family.version
            );
            return Ok(Channel::new(conn, family, group_id, NegotiationState::Disabled));
        }

        let negotiation = match set_features(&conn, &family) {
            Ok(()) => NegotiationState::Enabled,
            Err(e) if self.degraded_fallback => {
                log::warn!("SET_FEATURES failed, continuing without replies: {}", e);
                NegotiationState::Disabled
            }
            Err(e) => return Err(BridgeError::NegotiationFailed(Box::new(e))),
        };

        Ok(Channel::new(conn, family, group_id, negotiation))
    }
}

/// Builds the `TCMU_CMD_SET_FEATURES` request asserting kernel command
/// reply support.
pub fn set_features_message(version: u8) -> Result<GenlMessage> {
    let data = attr::encode(&[Attribute::flag(TcmuAttr::SuppKernCmdReply.code())])?;
    Ok(GenlMessage::new(TcmuCmd::SetFeatures.code(), version, data))
}

fn set_features(conn: &Conn, family: &Family) -> Result<()> {
    let req = set_features_message(family.version)?;
    conn.send(&req, family.id, NLM_F_REQUEST)?;
    log::debug!("sent SET_FEATURES to family {}", family.id);
    Ok(())
}
