//! Relay driver error types.

use std::fmt;

/// Errors that can occur while the relay driver processes an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Socket not found in registry.
    ///
    /// Occurs when a frame or pong arrives for a socket that was already
    /// terminated. Transient - the socket task is about to finish.
    SocketNotFound(u64),

    /// Socket already registered.
    ///
    /// Socket IDs are drawn from the environment RNG, so a collision means
    /// the runtime reused an ID. The new socket is refused.
    SocketAlreadyExists(u64),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketNotFound(id) => write!(f, "socket not found: {id}"),
            Self::SocketAlreadyExists(id) => write!(f, "socket already exists: {id}"),
        }
    }
}

impl std::error::Error for DriverError {}
