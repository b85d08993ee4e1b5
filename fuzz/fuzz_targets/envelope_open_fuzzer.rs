//! Fuzz target for envelope verification and decryption
//!
//! Every frame on the relay is attacker-controlled (HIGH priority)
//!
//! # Strategy
//!
//! - Raw text: arbitrary strings through `from_json` and `open`
//! - Tampered envelopes: a valid sealed envelope with one byte of one field
//!   xor-ed after base64 decoding
//! - Wrong key: a valid envelope opened under another room's key
//!
//! # Invariants
//!
//! - Parsing and opening never panic
//! - A tampered envelope either fails or opens to the original payload and
//!   sender (a no-op mutation)
//! - An envelope never opens under another room's key

#![no_main]

use arbitrary::Arbitrary;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chatspace_crypto::{Channel, Identity};
use chatspace_proto::{Command, Envelope, PresenceUpdate};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Tampered { seal: SealInput, field: Field, index: usize, mask: u8 },
    WrongKey { seal: SealInput, other_token: String },
}

#[derive(Debug, Arbitrary)]
struct SealInput {
    secret: [u8; 32],
    iv: [u8; 12],
    token: String,
    text: String,
    name: String,
    caret_offset: i64,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Field {
    Algo,
    Data,
    PublicKey,
    Signature,
}

fn seal(input: &SealInput) -> (Envelope, Command, Channel, Identity) {
    let identity = Identity::from_secret(input.secret);
    let channel = Channel::derive(&input.token);
    let command = Command::TextUpdated(PresenceUpdate {
        session_id: "fuzz".to_string(),
        text: input.text.clone(),
        name: input.name.clone(),
        caret_offset: input.caret_offset,
        is_active: true,
        time: 0,
    });
    let envelope = Envelope::seal(&command, channel.key(), &identity, input.iv)
        .expect("presence updates always serialize");
    (envelope, command, channel, identity)
}

fn flip(encoded: &str, index: usize, mask: u8) -> String {
    let mut bytes = BASE64.decode(encoded).expect("sealed fields are valid base64");
    if !bytes.is_empty() {
        let index = index % bytes.len();
        bytes[index] ^= mask;
    }
    BASE64.encode(bytes)
}

fuzz_target!(|input: Input| {
    match input {
        Input::Raw(text) => {
            if let Ok(envelope) = Envelope::from_json(&text) {
                let _ = envelope.open::<Command>(Channel::derive("").key());
            }
        },
        Input::Tampered { seal: seal_input, field, index, mask } => {
            let (mut envelope, command, channel, identity) = seal(&seal_input);
            match field {
                Field::Algo => {
                    let mut algo = envelope.algo.into_bytes();
                    let index = index % algo.len();
                    algo[index] ^= mask;
                    envelope.algo = String::from_utf8_lossy(&algo).into_owned();
                },
                Field::Data => envelope.data = flip(&envelope.data, index, mask),
                Field::PublicKey => envelope.public_key = flip(&envelope.public_key, index, mask),
                Field::Signature => envelope.signature = flip(&envelope.signature, index, mask),
            }

            if let Ok(opened) = envelope.open::<Command>(channel.key()) {
                assert_eq!(mask, 0, "tampered envelope opened");
                assert_eq!(opened.payload, command);
                assert_eq!(opened.sender, identity.fingerprint());
            }
        },
        Input::WrongKey { seal: seal_input, other_token } => {
            if other_token == seal_input.token {
                return;
            }
            let (envelope, ..) = seal(&seal_input);
            let other = Channel::derive(&other_token);
            assert!(envelope.open::<Command>(other.key()).is_err(), "opened under another key");
        },
    }
});
