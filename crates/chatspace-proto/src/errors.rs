//! Envelope errors.
//!
//! Every way an inbound envelope can be rejected has its own variant so the
//! receiver can pick a log level: traffic sealed under another room's key is
//! routine on a shared relay, a bad signature is not.

use thiserror::Error;

/// Result type for envelope operations
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Errors from sealing or opening an envelope
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Outer frame or inner encrypted object is not the expected JSON shape
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope {
        /// What was wrong with the shape
        reason: String,
    },

    /// An `algo` field did not match the expected constant
    #[error("unknown algorithm: {found}")]
    UnknownAlgorithm {
        /// The algorithm identifier that was received
        found: String,
    },

    /// Signature, public key or signed data failed verification
    #[error("invalid signature")]
    InvalidSignature,

    /// Payload does not decrypt under this channel key
    #[error("decryption failed")]
    DecryptionFailed,

    /// Decrypted payload is not a valid message
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// Deserialization failure
        reason: String,
    },

    /// Outgoing payload could not be serialized
    #[error("encoding failed: {reason}")]
    Encoding {
        /// Serialization failure
        reason: String,
    },
}

impl EnvelopeError {
    /// Whether this error was caused by the remote side.
    ///
    /// Protocol violations are dropped and logged; they never close the
    /// connection. Only `Encoding` originates locally.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::Encoding { .. })
    }

    /// Whether this is the routine case of traffic for a different key.
    pub fn is_foreign_traffic(&self) -> bool {
        matches!(self, Self::DecryptionFailed)
    }
}
