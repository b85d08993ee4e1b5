//! Client
//!
//! Action-based client state machine for chatspace rooms. Tracks peer
//! presence, sends the local composer state, and runs the private invite
//! handshake.
//!
//! # Architecture
//!
//! The client follows the Sans-IO pattern of [`chatspace_core`]. It receives
//! events ([`ClientEvent`]), processes them through pure state machine logic,
//! and returns actions ([`ClientAction`]) for the caller to execute. Frames
//! are sealed and opened with [`chatspace_proto::Envelope`]; a frame that
//! fails any check is logged and dropped, never returned as an error.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine for one session
//! - [`PresenceTracker`]: Peer records with debounced clears and staleness
//! - [`Composer`]: Local text box and heartbeat
//! - [`InviteBook`]: Outstanding invites and their ephemeral keys
//! - [`Settings`]: Typed persistence over a [`KeyValueStore`]
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Client with WebSocket transport
//! - [`transport::connect`]: Connect to a relay channel

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
pub mod composer;
mod error;
mod event;
pub mod invite;
pub mod presence;
pub mod settings;

#[cfg(feature = "transport")]
pub mod transport;

pub use chatspace_core::{Environment, LogLevel};
pub use client::{ANONYMOUS, Client, ClientConfig, FLASH_COOLDOWN, RECONNECT_DELAY};
pub use composer::{BLUR_COMMIT_AFTER, Composer, HEARTBEAT_AFTER};
pub use error::{ClientError, SettingsError};
pub use event::{ClientAction, ClientEvent, ConnectionStatus, Notification, PresenceView};
pub use invite::{InviteBook, is_addressed_to};
pub use presence::{
    CLEAR_DELAY, MAX_NAME_CHARS, PresenceCounts, PresenceKey, PresenceRecord, PresenceStatus,
    PresenceTracker, STALE_AFTER,
};
pub use settings::{KeyValueStore, MemoryStore, Settings};
