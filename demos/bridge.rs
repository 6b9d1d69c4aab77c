// In demos/bridge.rs
// Acknowledges every TCM-USER device event until Ctrl+C.
//
//   RUST_LOG=debug cargo run --example bridge [channel] [group]
use std::env;

use tcmu_netlink::TCMU::{BridgeBuilder, DeviceEvent, Dispatcher, CHANNEL_NAME, GROUP_NAME};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let channel_name = args.get(1).map(String::as_str).unwrap_or(CHANNEL_NAME);
    let group_name = args.get(2).map(String::as_str).unwrap_or(GROUP_NAME);

    let channel = match BridgeBuilder::new()
        .with_channel_name(channel_name)
        .with_group_name(group_name)
        .with_degraded_fallback(true)
        .open()
    {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("Bridge: cannot open {}/{}: {}", channel_name, group_name, e);
            if e.is_fatal() {
                eprintln!("Bridge: is the target_core_user module loaded?");
            }
            std::process::exit(1);
        }
    };
    println!("Bridge: {:#?}", channel);

    let dispatcher = Dispatcher::with_handler(channel, |event: &DeviceEvent| {
        println!(
            "Bridge: {:?} device {} name={:?} minor={:?}",
            event.kind, event.device_id, event.name, event.minor
        );
        0
    });

    let shutdown = dispatcher.shutdown_handle();
    // Handle Ctrl+C to stop the receive loop
    ctrlc::set_handler(move || {
        if let Err(e) = shutdown.shutdown() {
            eprintln!("Bridge: failed to interrupt receive: {}", e);
        }
    })?;

    println!("Press Ctrl+C to exit...");
    dispatcher.run()?;

    let stats = dispatcher.stats().snapshot();
    println!(
        "Bridge: received {} acknowledged {} dropped {} reply failures {} receive errors {}",
        stats.received, stats.acknowledged, stats.dropped, stats.reply_failures, stats.receive_errors
    );
    Ok(())
}
