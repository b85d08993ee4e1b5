//! Typed application commands.
//!
//! Every decrypted payload is decoded into a [`Command`] at the envelope
//! boundary. The `command` field selects the variant and the remaining fields
//! are validated by serde, so handlers match on a closed set of variants
//! instead of probing loosely typed JSON.
//!
//! ```json
//! {"command":"text_updated","sessionId":"…","text":"hi","name":"Alice","caretOffset":2,"isActive":true,"time":1700000000000}
//! {"command":"room_invite","sessionId":"…","peerFingerprint":"…","peerSessionId":"…","publicKey":"…"}
//! ```

use serde::{Deserialize, Serialize};

/// Caret offset meaning "no caret" (unknown, unfocused, or out of range).
pub const NO_CARET: i64 = -1;

fn no_caret() -> i64 {
    NO_CARET
}

/// Application message carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// The sender's text box changed (or a heartbeat resent it).
    TextUpdated(PresenceUpdate),
    /// The sender's text box became empty.
    TextCleared(PresenceUpdate),
    /// Invite a specific peer session into a new private room.
    RoomInvite(InviteMessage),
    /// Answer to a [`Command::RoomInvite`].
    RoomInviteReply(InviteMessage),
}

impl Command {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TextUpdated(_) => "text_updated",
            Self::TextCleared(_) => "text_cleared",
            Self::RoomInvite(_) => "room_invite",
            Self::RoomInviteReply(_) => "room_invite_reply",
        }
    }
}

/// Snapshot of one session's composer.
///
/// Every field is optional on the wire; older senders omit `sessionId` and
/// `caretOffset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    /// Sender's session (tab or device) identifier.
    #[serde(default, alias = "uuid")]
    pub session_id: String,
    /// Current text, already trimmed by the sender.
    #[serde(default)]
    pub text: String,
    /// Sender's display name.
    #[serde(default)]
    pub name: String,
    /// Caret position in UTF-16 code units, or [`NO_CARET`].
    #[serde(default = "no_caret")]
    pub caret_offset: i64,
    /// Whether the sender's page is visible.
    #[serde(default)]
    pub is_active: bool,
    /// Sender's wall clock in milliseconds since the Unix epoch.
    #[serde(default)]
    pub time: u64,
}

impl Default for PresenceUpdate {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            text: String::new(),
            name: String::new(),
            caret_offset: NO_CARET,
            is_active: false,
            time: 0,
        }
    }
}

/// Invite or invite reply.
///
/// Messages travel over the shared room broadcast. `peerFingerprint` and
/// `peerSessionId` name the addressee; everybody else ignores the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteMessage {
    /// Sender's session identifier.
    pub session_id: String,
    /// Addressee's fingerprint (hex).
    pub peer_fingerprint: String,
    /// Addressee's session identifier.
    pub peer_session_id: String,
    /// Sender's ephemeral X25519 public key (base64).
    pub public_key: String,
    /// Sender's display name, for the invite prompt.
    #[serde(default)]
    pub name: String,
}
