//! Client error types.

use chatspace_crypto::CryptoError;
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`].
///
/// Protocol violations in received frames never surface here; they are
/// logged and dropped inside the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// A user-supplied private key was rejected; the previous identity is kept.
    #[error("invalid local key: {0}")]
    InvalidLocalKey(CryptoError),

    /// A send was attempted before an identity was loaded.
    #[error("identity keys are not available")]
    KeyUnavailable,

    /// The operation needs an open room.
    #[error("not in a room")]
    NotInRoom,

    /// An invite could not be started or answered.
    #[error("invalid invite: {reason}")]
    InvalidInvite {
        /// Why the invite was rejected
        reason: String,
    },
}

/// Errors from the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// A stored value had the wrong shape for the requested type.
    #[error("setting '{key}' has an unexpected shape: {reason}")]
    Decode {
        /// Setting name as requested
        key: String,
        /// Deserialization failure
        reason: String,
    },

    /// A value could not be serialized for storage.
    #[error("setting '{key}' could not be encoded: {reason}")]
    Encode {
        /// Setting name as requested
        key: String,
        /// Serialization failure
        reason: String,
    },

    /// The stored private key is not a valid identity.
    #[error("stored identity is invalid: {0}")]
    InvalidIdentity(CryptoError),
}
