//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from identity, signature, encryption and key exchange operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A user-supplied private key failed the format or length check
    #[error("invalid local key: {reason}")]
    InvalidLocalKey {
        /// Why the key was rejected
        reason: String,
    },

    /// A peer public key could not be decoded
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// Why the key was rejected
        reason: String,
    },

    /// Signature bytes were malformed or did not verify
    #[error("signature verification failed")]
    InvalidSignature,

    /// AEAD decryption failed (wrong key, wrong IV or tampered ciphertext)
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// X25519 produced an all-zero shared secret (low-order peer key)
    #[error("key exchange produced a non-contributory shared secret")]
    WeakKeyExchange,

    /// Fingerprint text was not 64 hex characters
    #[error("invalid fingerprint: {reason}")]
    InvalidFingerprint {
        /// Why the fingerprint was rejected
        reason: String,
    },
}
