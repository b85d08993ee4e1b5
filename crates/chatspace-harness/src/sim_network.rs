//! In-memory network of chatspace clients around a relay driver.
//!
//! `SimNetwork` executes the actions of every [`Client`] and of the
//! [`RelayDriver`] against each other without sockets: `Connect` opens a
//! relay socket, `Send` becomes a relay frame, and relay deliveries are
//! queued as `FrameReceived` events for the target client. Everything runs on
//! one [`SimEnv`], so a run is fully determined by its seed and the calls
//! made on the network.
//!
//! Delivery is FIFO over a single queue, which preserves per-sender order to
//! each receiver.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use chatspace_client::{
    CLEAR_DELAY, Client, ClientAction, ClientConfig, ClientError, ClientEvent, HEARTBEAT_AFTER,
};
use chatspace_core::{Environment, LogLevel, VirtualInstant};
use chatspace_crypto::Identity;
use chatspace_server::{DriverError, Frame, RelayAction, RelayConfig, RelayDriver, RelayEvent};

use crate::SimEnv;

/// Default virtual time between ticks.
pub const TICK_STEP: Duration = Duration::from_millis(100);

/// Index of a client in a [`SimNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub usize);

type Event = ClientEvent<VirtualInstant>;

struct SimPeer {
    client: Client<SimEnv>,
    socket: Option<u64>,
    link_up: bool,
    observed: Vec<ClientAction>,
}

/// Simulated clients and relay sharing one virtual clock.
pub struct SimNetwork {
    env: SimEnv,
    relay: RelayDriver<SimEnv>,
    peers: Vec<SimPeer>,
    sockets: HashMap<u64, PeerId>,
    queue: VecDeque<(PeerId, Event)>,
    tick_step: Duration,
}

impl SimNetwork {
    /// Create an empty network with a default relay.
    pub fn new(seed: u64) -> Self {
        Self::with_relay_config(seed, RelayConfig::default())
    }

    /// Create an empty network with a custom relay configuration.
    pub fn with_relay_config(seed: u64, config: RelayConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        Self {
            relay: RelayDriver::new(env.clone(), config),
            env,
            peers: Vec::new(),
            sockets: HashMap::new(),
            queue: VecDeque::new(),
            tick_step: TICK_STEP,
        }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Relay driver.
    pub fn relay(&self) -> &RelayDriver<SimEnv> {
        &self.relay
    }

    /// Add a client with a fixed session and optional identity.
    pub fn add_peer(&mut self, identity: Option<Identity>, session_id: &str, name: &str) -> PeerId {
        let mut client = Client::with_session_id(
            self.env.clone(),
            ClientConfig::default(),
            identity,
            session_id,
        );
        client.set_name(name);
        self.push_peer(client)
    }

    /// Add a client with an identity and session drawn from the seed.
    pub fn add_random_peer(&mut self, name: &str) -> PeerId {
        let identity = Identity::from_secret(self.env.random_array());
        let mut client = Client::new(self.env.clone(), ClientConfig::default(), Some(identity));
        client.set_name(name);
        self.push_peer(client)
    }

    fn push_peer(&mut self, client: Client<SimEnv>) -> PeerId {
        self.peers.push(SimPeer { client, socket: None, link_up: true, observed: Vec::new() });
        PeerId(self.peers.len() - 1)
    }

    /// All peers in insertion order.
    pub fn peer_ids(&self) -> impl Iterator<Item = PeerId> + use<> {
        (0..self.peers.len()).map(PeerId)
    }

    /// Client state of `peer`.
    pub fn client(&self, peer: PeerId) -> &Client<SimEnv> {
        &self.peers[peer.0].client
    }

    /// Relay socket currently held by `peer`.
    pub fn socket_of(&self, peer: PeerId) -> Option<u64> {
        self.peers[peer.0].socket
    }

    /// Every action `peer` produced so far, in order.
    pub fn observed(&self, peer: PeerId) -> &[ClientAction] {
        &self.peers[peer.0].observed
    }

    /// Drain the observed actions of `peer`.
    pub fn take_observed(&mut self, peer: PeerId) -> Vec<ClientAction> {
        std::mem::take(&mut self.peers[peer.0].observed)
    }

    /// Feed `event` to `peer`, then deliver until the network is idle.
    ///
    /// Only the error of `event` itself is returned; failures of follow-up
    /// events are logged.
    pub fn handle(&mut self, peer: PeerId, event: Event) -> Result<(), ClientError> {
        let actions = self.peers[peer.0].client.handle(event)?;
        self.execute_client_actions(peer, actions);
        self.run_until_idle();
        Ok(())
    }

    /// Deliver queued events until none remain.
    pub fn run_until_idle(&mut self) {
        while let Some((peer, event)) = self.queue.pop_front() {
            match self.peers[peer.0].client.handle(event) {
                Ok(actions) => self.execute_client_actions(peer, actions),
                Err(e) => tracing::warn!(peer = peer.0, "event failed: {}", e),
            }
        }
    }

    /// Advance virtual time, ticking the relay and every client each step.
    pub fn advance(&mut self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(self.tick_step);
            remaining -= step;
            self.env.advance(step);
            self.tick();
        }
    }

    /// Advance long enough for every client to heartbeat and every pending
    /// clear to fire.
    pub fn settle(&mut self) {
        self.advance(HEARTBEAT_AFTER + CLEAR_DELAY + self.tick_step * 3);
    }

    fn tick(&mut self) {
        match self.relay.process_event(RelayEvent::Tick) {
            Ok(actions) => self.execute_relay_actions(actions),
            Err(e) => log_driver_error(&e),
        }

        let now = self.env.now();
        for peer in self.peer_ids() {
            self.queue.push_back((peer, ClientEvent::Tick { now }));
        }
        self.run_until_idle();
    }

    /// Take `peer`'s link down or bring it back.
    ///
    /// A downed link closes the relay socket and refuses new connections, so
    /// the client keeps retrying until the link returns.
    pub fn set_link(&mut self, peer: PeerId, up: bool) {
        self.peers[peer.0].link_up = up;
        if !up {
            self.close_socket(peer, "link down");
        }
        self.run_until_idle();
    }

    /// Close `peer`'s socket on both ends, as if the connection broke.
    pub fn drop_connection(&mut self, peer: PeerId) {
        self.close_socket(peer, "connection reset");
        self.run_until_idle();
    }

    fn close_socket(&mut self, peer: PeerId, reason: &str) {
        let Some(socket_id) = self.peers[peer.0].socket.take() else {
            return;
        };
        self.sockets.remove(&socket_id);

        match self
            .relay
            .process_event(RelayEvent::SocketClosed { socket_id, reason: reason.to_string() })
        {
            Ok(actions) => self.execute_relay_actions(actions),
            Err(e) => log_driver_error(&e),
        }
        self.queue.push_back((peer, ClientEvent::Disconnected { reason: reason.to_string() }));
    }

    fn execute_client_actions(&mut self, peer: PeerId, actions: Vec<ClientAction>) {
        for action in actions {
            match &action {
                ClientAction::Connect { channel_name } => self.connect(peer, channel_name),
                ClientAction::Send(frame) => self.send(peer, frame),
                ClientAction::Log { level, message } => log(*level, peer, message),
                _ => {},
            }
            self.peers[peer.0].observed.push(action);
        }
    }

    fn connect(&mut self, peer: PeerId, channel_name: &str) {
        if let Some(socket_id) = self.peers[peer.0].socket.take() {
            self.sockets.remove(&socket_id);
            let closed =
                RelayEvent::SocketClosed { socket_id, reason: "replaced".to_string() };
            match self.relay.process_event(closed) {
                Ok(actions) => self.execute_relay_actions(actions),
                Err(e) => log_driver_error(&e),
            }
        }

        if !self.peers[peer.0].link_up {
            let reason = "relay unreachable".to_string();
            self.queue.push_back((peer, ClientEvent::Disconnected { reason }));
            return;
        }

        let socket_id = self.env.random_u64();
        let opened = RelayEvent::SocketOpened { socket_id, path: format!("/ws/{channel_name}") };
        match self.relay.process_event(opened) {
            Ok(actions) => self.execute_relay_actions(actions),
            Err(e) => log_driver_error(&e),
        }

        if self.relay.channel_of(socket_id).is_some() {
            self.peers[peer.0].socket = Some(socket_id);
            self.sockets.insert(socket_id, peer);
            self.queue.push_back((peer, ClientEvent::Connected));
        } else {
            let reason = "refused by relay".to_string();
            self.queue.push_back((peer, ClientEvent::Disconnected { reason }));
        }
    }

    fn send(&mut self, peer: PeerId, frame: &str) {
        let Some(socket_id) = self.peers[peer.0].socket else {
            tracing::debug!(peer = peer.0, "frame dropped: no socket");
            return;
        };

        let received = RelayEvent::FrameReceived { socket_id, frame: Frame::Text(frame.to_string()) };
        match self.relay.process_event(received) {
            Ok(actions) => self.execute_relay_actions(actions),
            Err(e) => log_driver_error(&e),
        }
    }

    fn execute_relay_actions(&mut self, actions: Vec<RelayAction>) {
        for action in actions {
            match action {
                RelayAction::Deliver { socket_id, frame } => {
                    let Some(&peer) = self.sockets.get(&socket_id) else {
                        continue;
                    };
                    match frame {
                        Frame::Text(text) => {
                            self.queue.push_back((peer, ClientEvent::FrameReceived(text)));
                        },
                        Frame::Binary(_) => {
                            tracing::debug!(peer = peer.0, "binary frame ignored");
                        },
                    }
                },
                RelayAction::Ping { socket_id } => {
                    if !self.sockets.contains_key(&socket_id) {
                        continue;
                    }
                    // Connected peers answer pings at the WebSocket layer.
                    let pong = RelayEvent::PongReceived { socket_id };
                    if let Err(e) = self.relay.process_event(pong) {
                        log_driver_error(&e);
                    }
                },
                RelayAction::Close { socket_id, reason } => {
                    if let Some(peer) = self.sockets.remove(&socket_id) {
                        self.peers[peer.0].socket = None;
                        self.queue.push_back((peer, ClientEvent::Disconnected { reason }));
                    }
                },
                RelayAction::Log { level, message } => {
                    log_relay(level, &message);
                },
            }
        }
    }
}

fn log(level: LogLevel, peer: PeerId, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(peer = peer.0, "{}", message),
        LogLevel::Info => tracing::info!(peer = peer.0, "{}", message),
        LogLevel::Warn => tracing::warn!(peer = peer.0, "{}", message),
        LogLevel::Error => tracing::error!(peer = peer.0, "{}", message),
    }
}

fn log_relay(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(target: "relay", "{}", message),
        LogLevel::Info => tracing::info!(target: "relay", "{}", message),
        LogLevel::Warn => tracing::warn!(target: "relay", "{}", message),
        LogLevel::Error => tracing::error!(target: "relay", "{}", message),
    }
}

fn log_driver_error(error: &DriverError) {
    tracing::warn!(target: "relay", "event failed: {}", error);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(secret: u8) -> Option<Identity> {
        Some(Identity::from_secret([secret; 32]))
    }

    #[test]
    fn joining_opens_a_relay_socket() {
        let mut net = SimNetwork::new(1);
        let alice = net.add_peer(identity(1), "alice-tab", "Alice");

        net.handle(alice, ClientEvent::JoinRoom { token: "abc".to_string() }).unwrap();

        let socket = net.socket_of(alice).unwrap();
        assert_eq!(net.relay().channel_of(socket), net.client(alice).channel_name());
    }

    #[test]
    fn downed_link_keeps_client_offline_until_restored() {
        let mut net = SimNetwork::new(2);
        let alice = net.add_peer(identity(1), "alice-tab", "Alice");
        net.handle(alice, ClientEvent::JoinRoom { token: "abc".to_string() }).unwrap();

        net.set_link(alice, false);
        net.advance(Duration::from_secs(1));
        assert_eq!(net.socket_of(alice), None);
        assert_eq!(net.relay().socket_count(), 0);

        net.set_link(alice, true);
        net.advance(Duration::from_millis(200));
        assert!(net.socket_of(alice).is_some());
    }

    #[test]
    fn same_seed_same_run() {
        let run = |seed| {
            let mut net = SimNetwork::new(seed);
            let a = net.add_random_peer("A");
            net.handle(a, ClientEvent::JoinRandomRoom).unwrap();
            net.client(a).room_token().map(str::to_string)
        };

        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }
}
