//! Channel derivation from room tokens.
//!
//! A room token never leaves the client. The relay routes on a one-way hash
//! of it, and payloads are encrypted under a key derived from it with HKDF:
//!
//! ```text
//! token ──SHA-256──────────────────────────────► channel name (hex)
//!   │
//!   └── "channel_key_" ‖ token ──HKDF-SHA256──► channel key (AES-256)
//! ```
//!
//! Both functions are total: every string, including the empty token of the
//! public room, maps to a channel.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Prefix mixed into the HKDF input keying material.
pub const CHANNEL_KEY_PREFIX: &str = "channel_key_";

/// Size of a channel key (AES-256).
pub const CHANNEL_KEY_SIZE: usize = 32;

/// Symmetric key protecting every payload sent within one room.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ChannelKey([u8; CHANNEL_KEY_SIZE]);

impl ChannelKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; CHANNEL_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; CHANNEL_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChannelKey(..)")
    }
}

/// Routing name and encryption key derived from one room token.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    key: ChannelKey,
}

impl Channel {
    /// Derive both halves of the channel from `token`.
    pub fn derive(token: &str) -> Self {
        Self { name: derive_channel_name(token), key: derive_channel_key(token) }
    }

    /// Relay routing key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload encryption key.
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

/// Hex SHA-256 of the UTF-8 token.
pub fn derive_channel_name(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// HKDF-SHA256 with empty salt and info over `"channel_key_" ‖ token`.
pub fn derive_channel_key(token: &str) -> ChannelKey {
    let mut ikm = Vec::with_capacity(CHANNEL_KEY_PREFIX.len() + token.len());
    ikm.extend_from_slice(CHANNEL_KEY_PREFIX.as_bytes());
    ikm.extend_from_slice(token.as_bytes());

    // An empty salt is equivalent to HashLen zero bytes (RFC 5869).
    let hkdf = Hkdf::<Sha256>::new(Some(b"".as_slice()), &ikm);
    ikm.zeroize();

    let mut key = [0u8; CHANNEL_KEY_SIZE];
    let Ok(()) = hkdf.expand(&[], &mut key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    ChannelKey(key)
}
