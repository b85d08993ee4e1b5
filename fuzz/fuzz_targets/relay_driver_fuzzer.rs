//! Fuzz target for relay routing and liveness
//!
//! The relay holds every socket of every room (HIGH priority)
//!
//! # Strategy
//!
//! - Arbitrary interleavings of opens, closes, frames, pongs and time steps
//! - Socket ids drawn from a small range so reuse and double-close happen
//! - Paths with and without a `/ws/` prefix, including empty segments
//!
//! # Invariants
//!
//! - The driver never panics
//! - Deliveries go to other members of the sender's channel, never the sender
//! - Every registered socket is in exactly one non-empty channel

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use bytes::Bytes;
use chatspace_core::env::test_utils::MockEnv;
use chatspace_server::{Frame, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Op {
    Open { socket: u8, path: String },
    Close { socket: u8 },
    Text { socket: u8, text: String },
    Binary { socket: u8, data: Vec<u8> },
    Pong { socket: u8 },
    Advance { secs: u8 },
}

fn check_delivery(driver: &RelayDriver<MockEnv>, sender: u64, actions: &[RelayAction]) {
    let channel = driver.channel_of(sender);
    for action in actions {
        if let RelayAction::Deliver { socket_id, .. } = action {
            assert_ne!(*socket_id, sender, "frame echoed to its sender");
            assert_eq!(driver.channel_of(*socket_id), channel, "frame crossed channels");
        }
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let env = MockEnv::new();
    let config = RelayConfig { max_connections: 8, ..RelayConfig::default() };
    let mut driver = RelayDriver::new(env.clone(), config);
    let mut opened_paths: Vec<String> = Vec::new();

    for op in ops {
        match op {
            Op::Open { socket, path } => {
                opened_paths.push(path.clone());
                let _ = driver.process_event(RelayEvent::SocketOpened {
                    socket_id: u64::from(socket % 16),
                    path,
                });
            },
            Op::Close { socket } => {
                let reason = String::new();
                let _ = driver
                    .process_event(RelayEvent::SocketClosed { socket_id: u64::from(socket % 16), reason });
            },
            Op::Text { socket, text } => {
                let socket_id = u64::from(socket % 16);
                let event = RelayEvent::FrameReceived { socket_id, frame: Frame::Text(text) };
                if let Ok(actions) = driver.process_event(event) {
                    check_delivery(&driver, socket_id, &actions);
                }
            },
            Op::Binary { socket, data } => {
                let socket_id = u64::from(socket % 16);
                let frame = Frame::Binary(Bytes::from(data));
                let event = RelayEvent::FrameReceived { socket_id, frame };
                if let Ok(actions) = driver.process_event(event) {
                    check_delivery(&driver, socket_id, &actions);
                }
            },
            Op::Pong { socket } => {
                let _ = driver.process_event(RelayEvent::PongReceived { socket_id: u64::from(socket % 16) });
            },
            Op::Advance { secs } => {
                env.advance(Duration::from_secs(u64::from(secs)));
                let _ = driver.process_event(RelayEvent::Tick);
            },
        }

        assert!(driver.socket_count() <= 8);
        let mut members = 0;
        let mut channels = 0;
        let mut seen: Vec<&str> = Vec::new();
        for path in &opened_paths {
            let channel = chatspace_server::channel_from_path(path);
            if seen.contains(&channel) {
                continue;
            }
            seen.push(channel);
            let count = driver.sockets_in_channel(channel).count();
            members += count;
            channels += usize::from(count > 0);
        }
        assert_eq!(members, driver.socket_count());
        assert_eq!(channels, driver.channel_count());
    }
});
