// Correlated *_DONE replies, user -> kernel.

use super::channel::{Channel, NegotiationState};
use super::consts::{TcmuAttr, TcmuCmd};
use super::event::DeviceId;
use crate::error::Result;
use crate::Core::attr::{self, Attribute};
use crate::Core::message::{GenlMessage, NLM_F_REQUEST};

/// Attributes of a reply, in wire order: capability flag (only when
/// negotiated), command status, device id.
pub fn reply_attributes(
    negotiation: NegotiationState,
    status: i32,
    device_id: DeviceId,
) -> Vec<Attribute> {
    let mut attrs = Vec::with_capacity(3);
    if negotiation.is_enabled() {
        attrs.push(Attribute::flag(TcmuAttr::SuppKernCmdReply.code()));
    }
    attrs.push(Attribute::i32(TcmuAttr::CmdStatus.code(), status));
    attrs.push(Attribute::new(
        TcmuAttr::DeviceId.code(),
        device_id.as_bytes().to_vec(),
    ));
    attrs
}

/// Builds the reply message for `done` at the given family version.
pub fn reply_message(
    negotiation: NegotiationState,
    version: u8,
    status: i32,
    device_id: DeviceId,
    done: TcmuCmd,
) -> Result<GenlMessage> {
    let data = attr::encode(&reply_attributes(negotiation, status, device_id))?;
    Ok(GenlMessage::new(done.code(), version, data))
}

impl Channel {
    /// Sends the acknowledgment for one event.
    ///
    /// # Arguments
    /// * `status` - result code for the kernel, 0 on success
    /// * `device_id` - id copied verbatim from the event
    /// * `done` - the `*_DONE` command matching the event
    ///
    /// Transport errors are returned as-is; the caller decides whether
    /// they matter.
    pub fn reply(&self, status: i32, device_id: DeviceId, done: TcmuCmd) -> Result<()> {
        let msg = reply_message(self.negotiation, self.family.version, status, device_id, done)?;
        self.conn.send(&msg, self.family.id, NLM_F_REQUEST)?;
        log::debug!(
            "sent {:?} for device {} (status {})",
            done,
            device_id,
            status
        );
        Ok(())
    }
}
