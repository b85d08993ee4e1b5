//! Property-based tests for the relay driver
//!
//! These tests verify the routing and liveness invariants for arbitrary
//! socket populations:
//!
//! 1. **Fan-out**: a frame reaches every other socket of the sender's channel
//!    exactly once, never the sender, never another channel
//! 2. **No empty channels**: after any open/close sequence every channel has
//!    a member and socket counts add up
//! 3. **Liveness**: answering sockets survive any number of sweeps; silent
//!    sockets are gone after the second sweep

use std::{collections::BTreeMap, time::Duration};

use chatspace_core::env::test_utils::MockEnv;
use chatspace_server::{Frame, RelayAction, RelayConfig, RelayDriver, RelayEvent};
use proptest::prelude::*;

const CHANNELS: [&str; 3] = ["a", "b", ""];

fn driver() -> (MockEnv, RelayDriver<MockEnv>) {
    let env = MockEnv::new();
    (env.clone(), RelayDriver::new(env, RelayConfig::default()))
}

fn open(driver: &mut RelayDriver<MockEnv>, socket_id: u64, channel: &str) {
    let path = format!("/ws/{channel}");
    driver.process_event(RelayEvent::SocketOpened { socket_id, path }).unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: Each frame is delivered once to every other channel member
    #[test]
    fn prop_fan_out_exactly_once(
        placement in prop::collection::vec(0usize..CHANNELS.len(), 1..20),
        sender_index in any::<prop::sample::Index>(),
        payload in ".{0,64}",
    ) {
        let (_, mut driver) = driver();
        let mut expected: BTreeMap<&str, Vec<u64>> = BTreeMap::new();

        for (socket_id, channel) in placement.iter().enumerate() {
            let socket_id = socket_id as u64;
            open(&mut driver, socket_id, CHANNELS[*channel]);
            expected.entry(CHANNELS[*channel]).or_default().push(socket_id);
        }

        let sender = sender_index.index(placement.len()) as u64;
        let sender_channel = CHANNELS[placement[sender as usize]];
        let frame = Frame::Text(payload);

        let actions = driver
            .process_event(RelayEvent::FrameReceived { socket_id: sender, frame: frame.clone() })
            .unwrap();

        let mut receivers = Vec::new();
        for action in actions {
            match action {
                RelayAction::Deliver { socket_id, frame: delivered } => {
                    prop_assert_eq!(&delivered, &frame);
                    receivers.push(socket_id);
                },
                other => prop_assert!(false, "unexpected action {:?}", other),
            }
        }

        let wanted: Vec<u64> = expected[sender_channel]
            .iter()
            .copied()
            .filter(|id| *id != sender)
            .collect();
        prop_assert_eq!(receivers, wanted);
    }

    /// Property: Channels never exist without members
    #[test]
    fn prop_no_empty_channels(
        ops in prop::collection::vec((any::<bool>(), 0u64..16, 0usize..CHANNELS.len()), 1..60),
    ) {
        let (_, mut driver) = driver();

        for (opening, socket_id, channel) in ops {
            if opening {
                let path = format!("/ws/{}", CHANNELS[channel]);
                // Reopening a live id is refused and leaves it where it was.
                let _ = driver.process_event(RelayEvent::SocketOpened { socket_id, path });
            } else {
                driver
                    .process_event(RelayEvent::SocketClosed { socket_id, reason: String::new() })
                    .unwrap();
            }

            let members: usize =
                CHANNELS.iter().map(|channel| driver.sockets_in_channel(channel).count()).sum();
            prop_assert_eq!(members, driver.socket_count());
            let non_empty = CHANNELS
                .iter()
                .filter(|channel| driver.sockets_in_channel(channel).next().is_some())
                .count();
            prop_assert_eq!(non_empty, driver.channel_count());
        }
    }

    /// Property: Sockets answering every ping survive; silent ones do not
    #[test]
    fn prop_liveness(
        responsive in prop::collection::vec(any::<bool>(), 1..12),
        sweeps in 2usize..6,
    ) {
        let (env, mut driver) = driver();
        for socket_id in 0..responsive.len() {
            open(&mut driver, socket_id as u64, "x");
        }

        for _ in 0..sweeps {
            env.advance(Duration::from_secs(30));
            let actions = driver.process_event(RelayEvent::Tick).unwrap();

            for action in actions {
                if let RelayAction::Ping { socket_id } = action {
                    if responsive[socket_id as usize] {
                        driver.process_event(RelayEvent::PongReceived { socket_id }).unwrap();
                    }
                }
            }
        }

        for (socket_id, answers) in responsive.iter().enumerate() {
            prop_assert_eq!(driver.channel_of(socket_id as u64).is_some(), *answers);
        }
    }
}
