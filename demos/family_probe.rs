// In demos/family_probe.rs
// Resolves generic netlink families and prints their multicast groups.
//
//   cargo run --example family_probe [family ...]
use std::env;

use tcmu_netlink::Core::Conn;
use tcmu_netlink::TCMU::{CHANNEL_NAME, REPLY_CAPABLE_VERSION};
use tcmu_netlink::BridgeError;

fn main() -> Result<(), BridgeError> {
    env_logger::init();

    let mut names: Vec<String> = env::args().skip(1).collect();
    if names.is_empty() {
        names.push(CHANNEL_NAME.to_string());
    }

    let conn = Conn::dial()?;
    println!("Probe: local port {}", conn.transport().local_port());

    for name in &names {
        match conn.get_family(name) {
            Ok(family) => {
                println!(
                    "{}: id {} version {} (replies {})",
                    family.name,
                    family.id,
                    family.version,
                    if family.version >= REPLY_CAPABLE_VERSION { "expected" } else { "not expected" }
                );
                for group in &family.groups {
                    println!("  group {:>4}  {}", group.id, group.name);
                }
            }
            Err(BridgeError::ChannelNotFound { name }) => println!("{}: not registered", name),
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
