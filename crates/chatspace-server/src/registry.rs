//! Channel registry for socket membership and liveness tracking.
//!
//! The registry maintains bidirectional mappings: channel → sockets (for
//! broadcast) and socket → channel (for cleanup on disconnect). A socket
//! belongs to exactly one channel, fixed by its upgrade path.
//!
//! Channels exist only while they have members. Removing the last socket of
//! a channel deletes the channel entry.

use std::collections::{BTreeSet, HashMap};

/// State kept for a connected socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    /// Channel the socket joined on upgrade.
    pub channel: String,
    /// Cleared when a ping is sent, set again by the matching pong.
    pub alive: bool,
}

/// Outcome of one liveness sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LivenessSweep {
    /// Sockets that missed the previous ping. Already removed.
    pub dead: Vec<u64>,
    /// Sockets that answered and must be pinged again.
    pub pinged: Vec<u64>,
}

/// Registry for tracking sockets and channel membership.
///
/// Members are kept ordered so broadcasts fan out in a stable order, which
/// keeps simulations reproducible.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    /// Socket ID → socket info
    sockets: HashMap<u64, SocketInfo>,
    /// Channel → set of member socket IDs
    channels: HashMap<String, BTreeSet<u64>>,
}

impl ChannelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket as a member of `channel`.
    ///
    /// New sockets start alive. Returns `false` if the socket already exists.
    pub fn register(&mut self, socket_id: u64, channel: &str) -> bool {
        if self.sockets.contains_key(&socket_id) {
            return false;
        }

        self.sockets.insert(socket_id, SocketInfo { channel: channel.to_string(), alive: true });
        self.channels.entry(channel.to_string()).or_default().insert(socket_id);
        true
    }

    /// Remove a socket and return the channel it was in.
    pub fn unregister(&mut self, socket_id: u64) -> Option<String> {
        let info = self.sockets.remove(&socket_id)?;

        if let Some(members) = self.channels.get_mut(&info.channel) {
            members.remove(&socket_id);
            if members.is_empty() {
                self.channels.remove(&info.channel);
            }
        }

        Some(info.channel)
    }

    /// Socket state. `None` if the socket doesn't exist.
    pub fn socket(&self, socket_id: u64) -> Option<&SocketInfo> {
        self.sockets.get(&socket_id)
    }

    /// Check if a socket is registered.
    pub fn has_socket(&self, socket_id: u64) -> bool {
        self.sockets.contains_key(&socket_id)
    }

    /// Channel a socket belongs to.
    pub fn channel_of(&self, socket_id: u64) -> Option<&str> {
        self.sockets.get(&socket_id).map(|info| info.channel.as_str())
    }

    /// All sockets in a channel, in ascending ID order.
    pub fn members(&self, channel: &str) -> impl Iterator<Item = u64> + '_ {
        self.channels.get(channel).into_iter().flat_map(|members| members.iter().copied())
    }

    /// Every other socket in the sender's channel.
    ///
    /// Empty if the sender is unknown.
    pub fn peers(&self, socket_id: u64) -> Vec<u64> {
        self.channel_of(socket_id)
            .map(|channel| self.members(channel).filter(|id| *id != socket_id).collect())
            .unwrap_or_default()
    }

    /// Record a pong. Returns `false` for unknown sockets.
    pub fn mark_alive(&mut self, socket_id: u64) -> bool {
        match self.sockets.get_mut(&socket_id) {
            Some(info) => {
                info.alive = true;
                true
            },
            None => false,
        }
    }

    /// Remove every socket that did not answer the previous ping and clear
    /// the liveness flag of the rest.
    pub fn sweep(&mut self) -> LivenessSweep {
        let mut sweep = LivenessSweep::default();

        for (&socket_id, info) in &mut self.sockets {
            if info.alive {
                info.alive = false;
                sweep.pinged.push(socket_id);
            } else {
                sweep.dead.push(socket_id);
            }
        }

        sweep.dead.sort_unstable();
        sweep.pinged.sort_unstable();

        for &socket_id in &sweep.dead {
            self.unregister(socket_id);
        }

        sweep
    }

    /// Number of connected sockets.
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Number of channels with at least one member.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sockets in a channel.
    pub fn channel_size(&self, channel: &str) -> usize {
        self.channels.get(channel).map_or(0, BTreeSet::len)
    }
}
