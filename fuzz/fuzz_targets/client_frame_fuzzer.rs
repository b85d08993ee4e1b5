//! Fuzz target for client frame handling
//!
//! Anyone in a room can send a client any text frame (HIGH priority)
//!
//! # Strategy
//!
//! - Raw strings, including JSON that looks like an envelope
//! - Valid envelopes from another identity carrying arbitrary commands
//! - Interleaved clock ticks so debounce and staleness timers fire
//!
//! # Invariants
//!
//! - Frame handling never returns an error and never panics
//! - A client never holds a presence record for its own session

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use chatspace_client::{Client, ClientConfig, ClientEvent, PresenceKey};
use chatspace_core::{Environment, env::test_utils::MockEnv};
use chatspace_crypto::{Channel, Identity};
use chatspace_proto::{Command, Envelope, InviteMessage, PresenceUpdate};
use libfuzzer_sys::fuzz_target;

const TOKEN: &str = "fuzz-room";
const SESSION: &str = "self-tab";

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Presence { secret: [u8; 32], cleared: bool, session: String, text: String, caret: i64 },
    Invite { secret: [u8; 32], reply: bool, peer_session: String, public_key: String },
    Tick { millis: u16 },
}

fuzz_target!(|inputs: Vec<Input>| {
    let env = MockEnv::new();
    let own = Identity::from_secret([7; 32]);
    let own_key = PresenceKey::new(own.fingerprint(), SESSION);
    let own_hex = own.fingerprint().to_hex();
    let mut client = Client::with_session_id(env.clone(), ClientConfig::default(), Some(own), SESSION);
    let channel = Channel::derive(TOKEN);

    let _ = client.handle(ClientEvent::JoinRoom { token: TOKEN.to_string() });
    let _ = client.handle(ClientEvent::Connected);

    for input in inputs {
        let frame = match input {
            Input::Raw(text) => text,
            Input::Presence { secret, cleared, session, text, caret } => {
                let update = PresenceUpdate {
                    session_id: session,
                    text,
                    name: "fuzzer".to_string(),
                    caret_offset: caret,
                    is_active: true,
                    time: 0,
                };
                let command =
                    if cleared { Command::TextCleared(update) } else { Command::TextUpdated(update) };
                seal(&command, &channel, secret, &env)
            },
            Input::Invite { secret, reply, peer_session, public_key } => {
                let message = InviteMessage {
                    session_id: "other-tab".to_string(),
                    peer_fingerprint: own_hex.clone(),
                    peer_session_id: peer_session,
                    public_key,
                    name: "fuzzer".to_string(),
                };
                let command =
                    if reply { Command::RoomInviteReply(message) } else { Command::RoomInvite(message) };
                seal(&command, &channel, secret, &env)
            },
            Input::Tick { millis } => {
                env.advance(Duration::from_millis(u64::from(millis)));
                let now = env.now();
                assert!(client.handle(ClientEvent::Tick { now }).is_ok());
                continue;
            },
        };

        assert!(client.handle(ClientEvent::FrameReceived(frame)).is_ok());
        assert!(client.presence().get(&own_key).is_none(), "own session shown as a peer");
    }
});

fn seal(command: &Command, channel: &Channel, secret: [u8; 32], env: &MockEnv) -> String {
    let sender = Identity::from_secret(secret);
    Envelope::seal(command, channel.key(), &sender, env.random_array())
        .and_then(|envelope| envelope.to_json())
        .expect("commands always serialize")
}
