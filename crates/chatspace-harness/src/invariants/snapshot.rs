//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture what each simulated client shows and what the relay
//! believes about its socket, so every invariant sees one consistent instant.

use chatspace_client::{ConnectionStatus, PresenceKey};

use crate::{PeerId, SimNetwork};

/// Snapshot of every client in a network.
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    /// Per-client state, in peer order.
    pub clients: Vec<ClientSnapshot>,
}

impl NetworkSnapshot {
    /// Capture the current state of `network`.
    pub fn of(network: &SimNetwork) -> Self {
        Self { clients: network.peer_ids().map(|peer| ClientSnapshot::of(network, peer)).collect() }
    }

    /// Snapshot of the client whose session is `key`.
    pub fn client_by_key(&self, key: &PresenceKey) -> Option<&ClientSnapshot> {
        self.clients.iter().find(|client| client.key.as_ref() == Some(key))
    }
}

/// Observable state of one client.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Peer index in the network.
    pub peer: usize,
    /// Presence key this client sends under. `None` without an identity.
    pub key: Option<PresenceKey>,
    /// Channel of the current room.
    pub channel: Option<String>,
    /// Channel the relay has the client's socket in.
    pub relay_channel: Option<String>,
    /// Connection status.
    pub status: ConnectionStatus,
    /// Trimmed text most recently sent.
    pub last_sent: String,
    /// Peer records, ordered by key.
    pub records: Vec<RecordSnapshot>,
}

impl ClientSnapshot {
    fn of(network: &SimNetwork, peer: PeerId) -> Self {
        let client = network.client(peer);
        let presence = client.presence();
        let relay_channel = network
            .socket_of(peer)
            .and_then(|socket| network.relay().channel_of(socket))
            .map(str::to_string);

        Self {
            peer: peer.0,
            key: client.fingerprint().map(|fp| PresenceKey::new(fp, client.session_id())),
            channel: client.channel_name().map(str::to_string),
            relay_channel,
            status: client.status(),
            last_sent: client.composer().last_sent().to_string(),
            records: presence
                .records()
                .map(|record| RecordSnapshot {
                    key: record.key.clone(),
                    text: record.text.clone(),
                    pending_clear: presence.has_pending_clear(&record.key),
                })
                .collect(),
        }
    }

    /// Whether the client has a live socket.
    pub fn is_online(&self) -> bool {
        self.status == ConnectionStatus::Online
    }

    /// Record for `key`, if shown.
    pub fn record(&self, key: &PresenceKey) -> Option<&RecordSnapshot> {
        self.records.iter().find(|record| &record.key == key)
    }
}

/// One presence record as a receiver holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSnapshot {
    /// Sender session.
    pub key: PresenceKey,
    /// Text currently shown.
    pub text: String,
    /// Whether a debounced clear is waiting to fire.
    pub pending_clear: bool,
}
