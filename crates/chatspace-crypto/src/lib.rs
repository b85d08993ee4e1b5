//! Chatspace Cryptographic Primitives
//!
//! Cryptographic building blocks for chatspace. Pure functions with
//! deterministic outputs. Callers provide random bytes for deterministic
//! testing.
//!
//! # Key Hierarchy
//!
//! Each client has one long-term signing identity. Each room is addressed by a
//! token that both names the relay channel and seeds the payload key. Private
//! rooms get their tokens from an ephemeral exchange between two peers.
//!
//! ```text
//! Ed25519 identity ──SHA-256──► fingerprint (peer identity)
//!        │
//!        └─► signs SHA-256(encrypted payload)
//!
//! room token ──SHA-256──► channel name (relay routing)
//!        │
//!        └─HKDF──► channel key ──AES-256-GCM──► encrypted payload
//!
//! X25519(ephemeral A, ephemeral B) ──SHA-256──► new room token
//! ```
//!
//! # Security
//!
//! Confidentiality:
//! - Payloads are encrypted under a key the relay cannot derive from the
//!   routing hash
//! - Receiving traffic for another room fails authentication and is dropped
//!
//! Authenticity:
//! - Every envelope is signed by the sender's long-term key
//! - The sender fingerprint is computed from the verified public key, never
//!   taken from the payload
//!
//! Invite privacy:
//! - Ephemeral X25519 keys exist only for one outstanding invite
//! - Low-order peer keys are rejected so neither side can force a known token

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod channel;
pub mod error;
pub mod exchange;
pub mod identity;

pub use aead::{IV_SIZE, TAG_SIZE, decrypt, encrypt};
pub use channel::{Channel, ChannelKey, derive_channel_key, derive_channel_name};
pub use error::CryptoError;
pub use exchange::{EphemeralKeyPair, SharedSecret, derive_room_token, random_room_token};
pub use identity::{ExportedPrivateKey, Fingerprint, Identity, SIGNATURE_SIZE, verify_digest};
