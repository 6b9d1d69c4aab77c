//! User-space end of the TCM-USER generic netlink channel.
//!
//! The `target_core_user` kernel module announces device lifecycle events
//! (added, removed, reconfigured) on the `"config"` multicast group of the
//! `"TCM-USER"` family and, from family version 2 on, waits for a matching
//! `*_DONE` reply before it proceeds.
//!
//! - [`Core`]: raw netlink plumbing (socket, framing, attribute codec,
//!   controller lookups)
//! - [`TCMU`]: channel negotiation, the event dispatcher and replies
//!
//! ```rust,ignore
//! use tcmu_netlink::TCMU::{BridgeBuilder, Dispatcher};
//!
//! let channel = BridgeBuilder::new().open()?;
//! let dispatcher = Dispatcher::new(channel);
//! let shutdown = dispatcher.shutdown_handle();
//! ctrlc::set_handler(move || { let _ = shutdown.shutdown(); })?;
//! dispatcher.run()?;
//! ```

// Module naming follows project convention (Core = OS plumbing, TCMU = protocol)
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod TCMU;
#[allow(non_snake_case)]
mod Debug;

pub mod error;

pub use error::{BridgeError, Result};
