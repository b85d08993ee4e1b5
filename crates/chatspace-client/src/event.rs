//! Client events and actions.

use std::collections::BTreeMap;

use chatspace_core::LogLevel;
use chatspace_crypto::{ExportedPrivateKey, Fingerprint};
use serde::Serialize;

use crate::presence::{PresenceCounts, PresenceKey, PresenceStatus};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Forwarding socket lifecycle and received text frames
/// - Driving time forward via ticks (about once a second)
/// - Forwarding user intents (typing, focus, room changes, invites)
///
/// Generic over `I` (Instant type) so simulations can run on a virtual clock.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Time tick for timers, staleness sweeps and heartbeats.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Text frame received from the relay.
    FrameReceived(String),

    /// The socket requested by [`ClientAction::Connect`] is open.
    Connected,

    /// The socket closed.
    Disconnected {
        /// Close reason, for logs.
        reason: String,
    },

    /// Network reachability changed.
    NetworkChanged {
        /// Whether the network is reachable.
        online: bool,
    },

    /// The text box content or caret changed.
    TextInput {
        /// Full text box content.
        text: String,
        /// Caret in UTF-16 code units, or -1.
        caret_offset: i64,
    },

    /// The user committed the text (Enter or the clear button).
    Commit,

    /// The text box gained or lost focus.
    FocusChanged {
        /// Whether the text box has focus.
        focused: bool,
    },

    /// The page was hidden or shown.
    VisibilityChanged {
        /// Whether the page is hidden.
        hidden: bool,
    },

    /// The user edited their display name.
    NameChanged {
        /// New display name.
        name: String,
    },

    /// Open the room for `token`. The empty token is the public room.
    JoinRoom {
        /// Room token.
        token: String,
    },

    /// Open a room with a fresh random token.
    JoinRandomRoom,

    /// Reconnect if the socket is closed.
    Reconnect,

    /// Invite a peer session into a new private room.
    InvitePeer {
        /// Peer identity.
        fingerprint: Fingerprint,
        /// Peer session.
        session_id: String,
    },

    /// Replace the identity with a user-supplied base64 private key.
    ImportPrivateKey {
        /// Base64 private key.
        private_key: String,
    },

    /// Mark a peer as a friend.
    AddFriend {
        /// Peer identity.
        fingerprint: Fingerprint,
        /// Name to remember.
        name: String,
    },

    /// Unmark a friend.
    RemoveFriend {
        /// Peer identity.
        fingerprint: Fingerprint,
    },
}

/// Socket state shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No socket.
    Offline,
    /// Socket requested, not yet open.
    Connecting,
    /// Socket open.
    Online,
}

/// Presence record as handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    /// Hex fingerprint.
    pub fingerprint: String,
    /// First 8 hex characters of the fingerprint.
    pub short_fingerprint: String,
    /// Peer session.
    pub session_id: String,
    /// Display name, "Anonymous" if empty.
    pub user_name: String,
    /// Newline-free text.
    pub text: String,
    /// Caret in UTF-16 code units, or -1 for none.
    pub caret_offset: i64,
    /// Whether the peer is in the friends map.
    pub is_friend: bool,
    /// Typing or idle.
    pub status: PresenceStatus,
}

/// Notification request for a hidden page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Tag; notifications with the same tag replace each other.
    pub tag: String,
    /// Opaque data returned when the notification is clicked.
    pub data: String,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Open a socket to `/ws/{channel_name}`, closing any previous one.
    Connect {
        /// Relay routing key.
        channel_name: String,
    },

    /// Send a text frame on the current socket.
    Send(String),

    /// Show or update a presence record.
    PresenceUpserted(PresenceView),

    /// Stop showing a presence record.
    PresenceRemoved {
        /// Record key.
        key: PresenceKey,
    },

    /// Online, typing or idle counts changed.
    CountsChanged(PresenceCounts),

    /// The first comment appeared while the user was not typing.
    Flash,

    /// Show a system notification.
    Notify(Notification),

    /// A peer invited us into a private room.
    ///
    /// The caller asks the user and feeds back
    /// [`ClientEvent::JoinRoom`] to accept.
    InviteReceived {
        /// Derived room token.
        token: String,
        /// Inviter identity.
        from: Fingerprint,
        /// Inviter session.
        from_session: String,
        /// Inviter display name.
        name: String,
    },

    /// The current room changed. The caller records it as visited.
    RoomChanged {
        /// Room token.
        token: String,
        /// Relay routing key.
        channel_name: String,
    },

    /// The local text box should be emptied.
    ComposerCleared,

    /// Connection status changed.
    StatusChanged(ConnectionStatus),

    /// Persist a new identity.
    PersistIdentity(ExportedPrivateKey),

    /// Persist the friends map.
    FriendsChanged(BTreeMap<Fingerprint, String>),

    /// Log message for the driver.
    Log {
        /// Severity.
        level: LogLevel,
        /// Log message.
        message: String,
    },
}
