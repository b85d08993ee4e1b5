//! Private room invites over the shared room broadcast.
//!
//! ```text
//!  A (inviter)                                   B (invitee)
//!  initiate(B) ─ room_invite{peer=B, pubA} ──►   is_addressed_to(B)?
//!  [keypair stored for B]                        respond(): token = H(X25519(b, A))
//!                ◄── room_invite_reply{peer=A, pubB}
//!  complete(): token = H(X25519(a, B))           InviteReceived(token)
//!  [keypair dropped, join token]                 [join on user request]
//! ```
//!
//! Invites are addressed by the fingerprint and session fields they carry,
//! not by relay routing, so every recipient runs [`is_addressed_to`] first.

use std::collections::HashMap;

use chatspace_crypto::{CryptoError, EphemeralKeyPair, Fingerprint};
use chatspace_proto::InviteMessage;

/// Whether an invite or reply names this client's identity and session.
pub fn is_addressed_to(message: &InviteMessage, fingerprint: &Fingerprint, session_id: &str) -> bool {
    message.peer_session_id == session_id
        && message.peer_fingerprint.parse::<Fingerprint>().is_ok_and(|peer| &peer == fingerprint)
}

/// Answer an invite from `inviter`.
///
/// Returns the reply to send and the derived room token.
///
/// # Errors
///
/// - `InvalidPublicKey`: the inviter's key does not decode
/// - `WeakKeyExchange`: the inviter's key is a low-order point
pub fn respond(
    invite: &InviteMessage,
    inviter: &Fingerprint,
    seed: [u8; 32],
    session_id: &str,
    name: &str,
) -> Result<(InviteMessage, String), CryptoError> {
    let keypair = EphemeralKeyPair::from_seed(seed);
    let token = keypair.agree_base64(&invite.public_key)?.room_token();

    let reply = InviteMessage {
        session_id: session_id.to_string(),
        peer_fingerprint: inviter.to_hex(),
        peer_session_id: invite.session_id.clone(),
        public_key: keypair.public_key_base64(),
        name: name.to_string(),
    };
    Ok((reply, token))
}

#[derive(Debug)]
struct PendingInvite {
    keypair: EphemeralKeyPair,
    peer_session_id: String,
}

/// Outstanding invites keyed by the invited peer's fingerprint.
///
/// One keypair per peer. A new invite to the same peer replaces the old one.
#[derive(Debug, Default)]
pub struct InviteBook {
    pending: HashMap<Fingerprint, PendingInvite>,
}

impl InviteBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an invite to `peer`'s `peer_session_id`.
    pub fn initiate(
        &mut self,
        peer: Fingerprint,
        peer_session_id: &str,
        seed: [u8; 32],
        session_id: &str,
        name: &str,
    ) -> InviteMessage {
        let keypair = EphemeralKeyPair::from_seed(seed);
        let message = InviteMessage {
            session_id: session_id.to_string(),
            peer_fingerprint: peer.to_hex(),
            peer_session_id: peer_session_id.to_string(),
            public_key: keypair.public_key_base64(),
            name: name.to_string(),
        };

        self.pending
            .insert(peer, PendingInvite { keypair, peer_session_id: peer_session_id.to_string() });
        message
    }

    /// Finish an invite with the reply from `sender`.
    ///
    /// Returns `Ok(None)` for a stale or duplicate reply: no invite is
    /// outstanding for `sender`, or the reply came from a different session.
    /// Any other reply consumes the stored keypair.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey`: the reply key does not decode
    /// - `WeakKeyExchange`: the reply key is a low-order point
    pub fn complete(
        &mut self,
        sender: &Fingerprint,
        reply: &InviteMessage,
    ) -> Result<Option<String>, CryptoError> {
        let Some(pending) = self.pending.get(sender) else {
            return Ok(None);
        };
        if pending.peer_session_id != reply.session_id {
            return Ok(None);
        }

        let Some(pending) = self.pending.remove(sender) else {
            return Ok(None);
        };
        let secret = pending.keypair.agree_base64(&reply.public_key)?;
        Ok(Some(secret.room_token()))
    }

    /// Whether an invite to `peer` is outstanding.
    pub fn is_pending(&self, peer: &Fingerprint) -> bool {
        self.pending.contains_key(peer)
    }

    /// Number of outstanding invites.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no invite is outstanding.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every outstanding invite.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use chatspace_crypto::Identity;

    use super::*;

    fn alice() -> Fingerprint {
        Identity::from_secret([0xA1; 32]).fingerprint()
    }

    fn bob() -> Fingerprint {
        Identity::from_secret([0xB0; 32]).fingerprint()
    }

    #[test]
    fn addressing_requires_fingerprint_and_session() {
        let mut book = InviteBook::new();
        let invite = book.initiate(bob(), "bob-tab", [1u8; 32], "alice-tab", "Alice");

        assert!(is_addressed_to(&invite, &bob(), "bob-tab"));
        assert!(!is_addressed_to(&invite, &bob(), "other-tab"));
        assert!(!is_addressed_to(&invite, &alice(), "bob-tab"));
    }

    #[test]
    fn garbage_fingerprint_is_not_addressed() {
        let invite = InviteMessage {
            session_id: "a".to_string(),
            peer_fingerprint: "zz".to_string(),
            peer_session_id: "b".to_string(),
            public_key: String::new(),
            name: String::new(),
        };
        assert!(!is_addressed_to(&invite, &bob(), "b"));
    }

    #[test]
    fn handshake_derives_same_token_on_both_sides() {
        let mut book = InviteBook::new();
        let invite = book.initiate(bob(), "bob-tab", [1u8; 32], "alice-tab", "Alice");

        let (reply, bob_token) = respond(&invite, &alice(), [2u8; 32], "bob-tab", "Bob").unwrap();
        assert!(is_addressed_to(&reply, &alice(), "alice-tab"));

        let alice_token = book.complete(&bob(), &reply).unwrap();
        assert_eq!(alice_token, Some(bob_token));
        assert!(book.is_empty());
    }

    #[test]
    fn duplicate_reply_is_stale() {
        let mut book = InviteBook::new();
        let invite = book.initiate(bob(), "bob-tab", [1u8; 32], "alice-tab", "Alice");
        let (reply, _) = respond(&invite, &alice(), [2u8; 32], "bob-tab", "Bob").unwrap();

        assert!(book.complete(&bob(), &reply).unwrap().is_some());
        assert_eq!(book.complete(&bob(), &reply), Ok(None));
    }

    #[test]
    fn reply_from_other_session_is_stale_and_keeps_state() {
        let mut book = InviteBook::new();
        let invite = book.initiate(bob(), "bob-tab", [1u8; 32], "alice-tab", "Alice");
        let (reply, _) = respond(&invite, &alice(), [2u8; 32], "bob-phone", "Bob").unwrap();

        assert_eq!(book.complete(&bob(), &reply), Ok(None));
        assert!(book.is_pending(&bob()));
    }

    #[test]
    fn new_invite_overwrites_previous_keypair() {
        let mut book = InviteBook::new();
        let first = book.initiate(bob(), "bob-tab", [1u8; 32], "alice-tab", "Alice");
        let second = book.initiate(bob(), "bob-tab", [3u8; 32], "alice-tab", "Alice");
        assert_eq!(book.len(), 1);

        let (old_reply, old_token) = respond(&first, &alice(), [2u8; 32], "bob-tab", "Bob").unwrap();
        let token = book.complete(&bob(), &old_reply).unwrap();
        assert_ne!(token, Some(old_token));

        let (_, new_token) = respond(&second, &alice(), [2u8; 32], "bob-tab", "Bob").unwrap();
        assert_eq!(token, Some(new_token));
    }

    #[test]
    fn weak_invite_key_is_rejected() {
        let invite = InviteMessage {
            session_id: "alice-tab".to_string(),
            peer_fingerprint: bob().to_hex(),
            peer_session_id: "bob-tab".to_string(),
            public_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            name: String::new(),
        };

        assert_eq!(
            respond(&invite, &alice(), [2u8; 32], "bob-tab", "Bob").map(|(_, token)| token),
            Err(CryptoError::WeakKeyExchange)
        );
    }
}
