//! Payload encryption using AES-256-GCM
//!
//! All functions are pure - the IV must be provided by the caller.
//! This enables deterministic testing and keeps the client Sans-IO.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{channel::ChannelKey, error::CryptoError};

/// Size of the AES-GCM initialization vector (12 bytes)
pub const IV_SIZE: usize = 12;

/// GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under the channel key.
///
/// Returns the ciphertext with the 16-byte tag appended.
///
/// # Security
///
/// - Caller MUST provide a fresh random IV for every message; reusing an IV
///   under the same key breaks both confidentiality and authenticity
pub fn encrypt(key: &ChannelKey, iv: [u8; IV_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&iv), plaintext) else {
        unreachable!("AES-GCM encryption cannot fail for in-memory payloads");
    };

    ciphertext
}

/// Decrypt and authenticate a ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// - `DecryptionFailed`: wrong IV length, wrong key, or tampered ciphertext
pub fn decrypt(key: &ChannelKey, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("iv must be {IV_SIZE} bytes, got {}", iv.len()),
        });
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher.decrypt(Nonce::from_slice(iv), ciphertext).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}
