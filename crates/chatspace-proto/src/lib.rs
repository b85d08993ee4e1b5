//! Chatspace Wire Protocol
//!
//! Typed application commands and the signed, encrypted envelope that carries
//! them through the relay.
//!
//! # Layers
//!
//! ```text
//! Command (typed enum) ──serde_json──► payload bytes
//!        │
//!        └─► Envelope::seal ──► AES-GCM under the channel key
//!                               Ed25519 over SHA-256(encrypted object)
//!                               JSON text frame for the relay
//! ```
//!
//! Receivers call [`Envelope::from_json`] then [`Envelope::open`], which
//! yields a [`Command`] and the verified sender fingerprint, or an
//! [`EnvelopeError`] naming the layer that rejected the frame. Every error is
//! handled where it occurs; none of them should close a connection.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod envelope;
pub mod errors;

pub use command::{Command, InviteMessage, NO_CARET, PresenceUpdate};
pub use envelope::{CIPHER_ALGORITHM, Envelope, Opened, SIGNATURE_ALGORITHM};
pub use errors::{EnvelopeError, Result};
