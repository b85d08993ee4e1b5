//! Standard invariant checks.

use chatspace_client::presence::strip_newlines;

use super::{Invariant, InvariantResult, NetworkSnapshot, Violation};

/// A client never holds a record for its own session.
///
/// Own frames come back from the relay only through other tabs; the sender's
/// exact session must be filtered out.
pub struct NoSelfPresence;

impl Invariant for NoSelfPresence {
    fn name(&self) -> &'static str {
        "NoSelfPresence"
    }

    fn check(&self, state: &NetworkSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(own) = &client.key else { continue };
            if client.record(own).is_some() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {} shows its own session {}", client.peer, own),
                });
            }
        }
        Ok(())
    }
}

/// Every record belongs to a session that exists in the network.
///
/// Records are only created from frames that verified against a sender key,
/// so an unknown key means a forged or corrupted frame was accepted.
pub struct KnownSenders;

impl Invariant for KnownSenders {
    fn name(&self) -> &'static str {
        "KnownSenders"
    }

    fn check(&self, state: &NetworkSnapshot) -> InvariantResult {
        for client in &state.clients {
            for record in &client.records {
                if state.client_by_key(&record.key).is_none() {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} shows unknown session {}",
                            client.peer, record.key
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// An online client's socket sits in the channel of its current room.
pub struct SocketMatchesRoom;

impl Invariant for SocketMatchesRoom {
    fn name(&self) -> &'static str {
        "SocketMatchesRoom"
    }

    fn check(&self, state: &NetworkSnapshot) -> InvariantResult {
        for client in state.clients.iter().filter(|client| client.is_online()) {
            if client.relay_channel.is_none() || client.relay_channel != client.channel {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} is online in {:?} but the relay has it in {:?}",
                        client.peer, client.channel, client.relay_channel
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Online clients in one channel show each other's latest text.
///
/// Only holds once the network has settled: every receiver must hold a
/// record for every other identified sender in its channel. A record with a
/// pending clear is consistent only if the sender's last text was empty;
/// otherwise the record shows exactly what the sender last sent, minus
/// newlines.
pub struct PresenceConvergence;

impl Invariant for PresenceConvergence {
    fn name(&self) -> &'static str {
        "PresenceConvergence"
    }

    fn check(&self, state: &NetworkSnapshot) -> InvariantResult {
        let online: Vec<_> = state.clients.iter().filter(|client| client.is_online()).collect();

        for sender in &online {
            let Some(key) = &sender.key else { continue };

            for receiver in online.iter().filter(|r| r.peer != sender.peer) {
                if receiver.channel != sender.channel {
                    continue;
                }

                let Some(record) = receiver.record(key) else {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} has no record of client {}",
                            receiver.peer, sender.peer
                        ),
                    });
                };

                let consistent = if record.pending_clear {
                    sender.last_sent.is_empty()
                } else {
                    record.text == strip_newlines(&sender.last_sent)
                };

                if !consistent {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {} shows {:?} (pending clear: {}) for client {} who sent {:?}",
                            receiver.peer,
                            record.text,
                            record.pending_clear,
                            sender.peer,
                            sender.last_sent
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
