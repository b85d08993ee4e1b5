//! Relay runtime errors.
//!
//! Only socket plumbing fails here. Misbehaving peers are the driver's
//! concern and end up as logged [`crate::DriverError`]s, never as a
//! `ServerError`.

use std::{fmt, io};

use tokio_tungstenite::tungstenite;

/// Failure of the listener or of a single connection's upgrade.
#[derive(Debug)]
pub enum ServerError {
    /// The listen address could not be bound. Fatal at startup.
    Bind {
        /// Address as configured
        address: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// The bound listener stopped answering socket queries.
    Listener(io::Error),

    /// An accepted TCP stream did not complete the WebSocket handshake.
    ///
    /// Only that connection is dropped.
    Upgrade(Box<tungstenite::Error>),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { address, source } => write!(f, "cannot bind {address}: {source}"),
            Self::Listener(err) => write!(f, "listener error: {err}"),
            Self::Upgrade(err) => write!(f, "websocket upgrade failed: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Listener(err) => Some(err),
            Self::Upgrade(err) => Some(err.as_ref()),
        }
    }
}

impl From<tungstenite::Error> for ServerError {
    fn from(err: tungstenite::Error) -> Self {
        Self::Upgrade(Box::new(err))
    }
}
