// src/TCMU/dispatcher.rs

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::Backoff;

use super::channel::Channel;
use super::consts::TcmuCmd;
use super::event::{DeviceEvent, DeviceId};
use crate::error::{BridgeError, Result};
use crate::Core::message::GenlMessage;
use crate::Core::socket::NetlinkTransport;

/// Pause between receive attempts once spinning/yielding has not helped.
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// The device manager behind the bridge.
///
/// Called once per accepted event; the returned value is the status sent
/// back to the kernel (0 for success, a negative errno otherwise).
pub trait DeviceHandler: Send + Sync {
    fn handle(&self, event: &DeviceEvent) -> i32;
}

/// Acknowledges every event with success.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcknowledgeAll;

impl DeviceHandler for AcknowledgeAll {
    fn handle(&self, _event: &DeviceEvent) -> i32 {
        0
    }
}

impl<F> DeviceHandler for F
where
    F: Fn(&DeviceEvent) -> i32 + Send + Sync,
{
    fn handle(&self, event: &DeviceEvent) -> i32 {
        self(event)
    }
}

/// Per-dispatcher counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    received: AtomicU64,
    acknowledged: AtomicU64,
    dropped: AtomicU64,
    reply_failures: AtomicU64,
    receive_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSnapshot {
    /// Deliveries handed to `dispatch`.
    pub received: u64,
    /// Events answered with a `*_DONE` reply.
    pub acknowledged: u64,
    /// Deliveries rejected without a reply.
    pub dropped: u64,
    /// Replies the transport refused.
    pub reply_failures: u64,
    /// Failed receive calls.
    pub receive_errors: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reply_failures: self.reply_failures.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one delivery.
#[derive(Debug)]
pub enum Outcome {
    Acknowledged {
        command: TcmuCmd,
        device_id: DeviceId,
        status: i32,
    },
    ReplyFailed {
        command: TcmuCmd,
        device_id: DeviceId,
        error: BridgeError,
    },
    Dropped(BridgeError),
}

/// Stops a running [`Dispatcher`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    transport: Arc<dyn NetlinkTransport>,
}

impl ShutdownHandle {
    /// Sets the shutdown flag and wakes the blocked receive.
    pub fn shutdown(&self) -> io::Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        self.transport.interrupt()
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Receive loop for one channel.
///
/// Messages are handled strictly one at a time, so replies leave in the
/// order their events arrived.
pub struct Dispatcher {
    channel: Channel,
    handler: Box<dyn DeviceHandler>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Dispatcher that acknowledges every event with success.
    pub fn new(channel: Channel) -> Self {
        Self::with_handler(channel, AcknowledgeAll)
    }

    pub fn with_handler(channel: Channel, handler: impl DeviceHandler + 'static) -> Self {
        Self {
            channel,
            handler: Box::new(handler),
            shutdown: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            transport: Arc::clone(self.channel.conn.transport()),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Serves events until the shutdown handle fires.
    ///
    /// Receive errors, malformed messages and failed replies are logged
    /// and do not end the loop. The only error returned is an interrupted
    /// transport with no shutdown requested, since every later receive
    /// would fail the same way.
    pub fn run(&self) -> Result<()> {
        log::info!(
            "serving {} events (family {}, group {}, negotiation {:?})",
            self.channel.family.name,
            self.channel.id(),
            self.channel.group_id(),
            self.channel.negotiation()
        );

        let backoff = Backoff::new();
        while !self.is_shutdown() {
            log::debug!("receiving: ...");
            let msgs = match self.channel.conn.receive() {
                Ok(msgs) => {
                    backoff.reset();
                    msgs
                }
                Err(_) if self.is_shutdown() => break,
                Err(e) if e.is_interrupted() => {
                    log::error!("transport interrupted without shutdown request");
                    return Err(e);
                }
                Err(e) => {
                    DispatchStats::bump(&self.stats.receive_errors);
                    log::warn!("failed to receive: {}", e);
                    if backoff.is_completed() {
                        std::thread::sleep(RECEIVE_ERROR_PAUSE);
                    } else {
                        backoff.snooze();
                    }
                    continue;
                }
            };

            self.dispatch(&msgs);
        }

        log::info!("dispatcher stopped");
        Ok(())
    }

    /// Handles one delivery: validates it, decodes the event, asks the
    /// device handler for a status and sends the matching reply.
    pub fn dispatch(&self, msgs: &[GenlMessage]) -> Outcome {
        DispatchStats::bump(&self.stats.received);

        let msg = match msgs {
            [msg] => msg,
            _ => return self.drop_delivery(BridgeError::UnexpectedBatch(msgs.len())),
        };

        if msg.netlink.kind != self.channel.id() {
            return self.drop_delivery(BridgeError::WrongFamily {
                expected: self.channel.id(),
                got: msg.netlink.kind,
            });
        }

        let event = match DeviceEvent::decode(msg) {
            Ok(event) => event,
            Err(e) => return self.drop_delivery(e),
        };
        log::debug!("received {:?}", event);

        let status = self.handler.handle(&event);
        let command = event.kind.done_command();
        let device_id = event.device_id;

        match self.channel.reply(status, device_id, command) {
            Ok(()) => {
                DispatchStats::bump(&self.stats.acknowledged);
                Outcome::Acknowledged {
                    command,
                    device_id,
                    status,
                }
            }
            Err(error) => {
                DispatchStats::bump(&self.stats.reply_failures);
                log::error!(
                    "failed to send {:?} for device {}: {}",
                    command,
                    device_id,
                    error
                );
                Outcome::ReplyFailed {
                    command,
                    device_id,
                    error,
                }
            }
        }
    }

    fn drop_delivery(&self, reason: BridgeError) -> Outcome {
        DispatchStats::bump(&self.stats.dropped);
        match reason {
            BridgeError::UnexpectedCommand(_) => log::warn!("unexpected message: {}", reason),
            _ => log::warn!("dropping message: {}", reason),
        }
        Outcome::Dropped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TCMU::event::EventKind;

    #[test]
    fn test_closure_handler() {
        let handler = |event: &DeviceEvent| if event.kind == EventKind::Removed { -16 } else { 0 };
        let event = DeviceEvent {
            kind: EventKind::Removed,
            device_id: DeviceId::from_u32(3),
            name: None,
            minor: None,
            config: None,
            size: None,
            write_cache: None,
        };
        assert_eq!(DeviceHandler::handle(&handler, &event), -16);
        assert_eq!(AcknowledgeAll.handle(&event), 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = DispatchStats::default();
        DispatchStats::bump(&stats.received);
        DispatchStats::bump(&stats.received);
        DispatchStats::bump(&stats.dropped);
        assert_eq!(
            stats.snapshot(),
            DispatchSnapshot {
                received: 2,
                dropped: 1,
                ..Default::default()
            }
        );
    }
}
