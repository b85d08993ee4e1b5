//! Relay driver.
//!
//! Ties the [`ChannelRegistry`] to the relay's three jobs: admit sockets into
//! the channel named by their upgrade path, fan every frame out to the other
//! members of the sender's channel, and ping sockets so dead ones are
//! dropped. Frames are never inspected.

use std::time::Duration;

use bytes::Bytes;
pub use chatspace_core::LogLevel;
use chatspace_core::Environment;

use crate::{registry::ChannelRegistry, server_error::DriverError};

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Interval between liveness sweeps
    pub ping_interval: Duration,
    /// Maximum concurrent sockets
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { ping_interval: Duration::from_secs(30), max_connections: 10_000 }
    }
}

/// A WebSocket data frame, relayed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame. Chatspace envelopes are JSON text.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
}

impl Frame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Events that the relay driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A WebSocket upgrade completed
    SocketOpened {
        /// Unique socket ID assigned by the runtime
        socket_id: u64,
        /// Request path of the upgrade (e.g. `/ws/{channel}`)
        path: String,
    },

    /// A data frame was received from a socket
    FrameReceived {
        /// Socket that sent the frame
        socket_id: u64,
        /// The received frame
        frame: Frame,
    },

    /// A pong was received from a socket
    PongReceived {
        /// Socket that answered
        socket_id: u64,
    },

    /// A socket was closed (by peer or error)
    SocketClosed {
        /// Socket that was closed
        socket_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Periodic tick for liveness sweeps
    Tick,
}

/// Actions that the relay driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send a frame to a socket
    Deliver {
        /// Target socket ID
        socket_id: u64,
        /// Frame to send
        frame: Frame,
    },

    /// Send a ping to a socket
    Ping {
        /// Target socket ID
        socket_id: u64,
    },

    /// Terminate a socket. It is already removed from the registry.
    Close {
        /// Socket to close
        socket_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Routing key for an upgrade path: its last segment, verbatim.
///
/// `/ws/abc` routes to `abc`; `/` routes to the empty channel.
pub fn channel_from_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Action-based relay driver.
pub struct RelayDriver<E: Environment> {
    /// Socket/channel registry
    registry: ChannelRegistry,
    /// Environment (time)
    env: E,
    /// Relay configuration
    config: RelayConfig,
    /// When the next liveness sweep is due
    next_sweep: E::Instant,
}

impl<E: Environment> RelayDriver<E> {
    /// Create a new relay driver. The first sweep is due one ping interval
    /// from now.
    pub fn new(env: E, config: RelayConfig) -> Self {
        let next_sweep = env.now() + config.ping_interval;
        Self { registry: ChannelRegistry::new(), env, config, next_sweep }
    }

    /// Process a relay event and return actions to execute.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, DriverError> {
        match event {
            RelayEvent::SocketOpened { socket_id, path } => {
                self.handle_socket_opened(socket_id, &path)
            },
            RelayEvent::FrameReceived { socket_id, frame } => {
                self.handle_frame_received(socket_id, frame)
            },
            RelayEvent::PongReceived { socket_id } => {
                if self.registry.mark_alive(socket_id) {
                    Ok(Vec::new())
                } else {
                    Err(DriverError::SocketNotFound(socket_id))
                }
            },
            RelayEvent::SocketClosed { socket_id, reason } => {
                Ok(self.handle_socket_closed(socket_id, &reason))
            },
            RelayEvent::Tick => Ok(self.handle_tick()),
        }
    }

    fn handle_socket_opened(
        &mut self,
        socket_id: u64,
        path: &str,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if self.registry.has_socket(socket_id) {
            return Err(DriverError::SocketAlreadyExists(socket_id));
        }

        if self.registry.socket_count() >= self.config.max_connections {
            return Ok(vec![
                RelayAction::Log {
                    level: LogLevel::Warn,
                    message: format!("refusing socket {socket_id}: max connections exceeded"),
                },
                RelayAction::Close {
                    socket_id,
                    reason: "max connections exceeded".to_string(),
                },
            ]);
        }

        let channel = channel_from_path(path);
        self.registry.register(socket_id, channel);

        Ok(vec![RelayAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "socket {socket_id} joined channel {channel:?} ({} members)",
                self.registry.channel_size(channel)
            ),
        }])
    }

    fn handle_frame_received(
        &mut self,
        socket_id: u64,
        frame: Frame,
    ) -> Result<Vec<RelayAction>, DriverError> {
        if !self.registry.has_socket(socket_id) {
            return Err(DriverError::SocketNotFound(socket_id));
        }

        Ok(self
            .registry
            .peers(socket_id)
            .into_iter()
            .map(|peer| RelayAction::Deliver { socket_id: peer, frame: frame.clone() })
            .collect())
    }

    fn handle_socket_closed(&mut self, socket_id: u64, reason: &str) -> Vec<RelayAction> {
        match self.registry.unregister(socket_id) {
            Some(channel) => vec![RelayAction::Log {
                level: LogLevel::Debug,
                message: format!("socket {socket_id} left channel {channel:?}: {reason}"),
            }],
            // Already removed by a sweep or refused on open.
            None => Vec::new(),
        }
    }

    fn handle_tick(&mut self) -> Vec<RelayAction> {
        let now = self.env.now();
        if now < self.next_sweep {
            return Vec::new();
        }
        self.next_sweep = now + self.config.ping_interval;

        let sweep = self.registry.sweep();
        let mut actions = Vec::with_capacity(sweep.dead.len() * 2 + sweep.pinged.len());

        for socket_id in sweep.dead {
            actions.push(RelayAction::Log {
                level: LogLevel::Info,
                message: format!("terminating socket {socket_id}: no pong"),
            });
            actions.push(RelayAction::Close { socket_id, reason: "ping timeout".to_string() });
        }

        actions.extend(sweep.pinged.into_iter().map(|socket_id| RelayAction::Ping { socket_id }));
        actions
    }

    /// Sockets currently in `channel`.
    pub fn sockets_in_channel(&self, channel: &str) -> impl Iterator<Item = u64> + '_ {
        self.registry.members(channel)
    }

    /// Channel a socket belongs to.
    pub fn channel_of(&self, socket_id: u64) -> Option<&str> {
        self.registry.channel_of(socket_id)
    }

    /// Number of connected sockets.
    pub fn socket_count(&self) -> usize {
        self.registry.socket_count()
    }

    /// Number of non-empty channels.
    pub fn channel_count(&self) -> usize {
        self.registry.channel_count()
    }

    /// Relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use chatspace_core::env::test_utils::MockEnv;

    use super::*;

    fn driver() -> (MockEnv, RelayDriver<MockEnv>) {
        let env = MockEnv::new();
        (env.clone(), RelayDriver::new(env, RelayConfig::default()))
    }

    fn open(driver: &mut RelayDriver<MockEnv>, socket_id: u64, path: &str) {
        driver
            .process_event(RelayEvent::SocketOpened { socket_id, path: path.to_string() })
            .unwrap();
    }

    fn deliveries(actions: &[RelayAction]) -> Vec<(u64, Frame)> {
        actions
            .iter()
            .filter_map(|action| match action {
                RelayAction::Deliver { socket_id, frame } => Some((*socket_id, frame.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn channel_is_last_path_segment() {
        assert_eq!(channel_from_path("/ws/abc"), "abc");
        assert_eq!(channel_from_path("/abc"), "abc");
        assert_eq!(channel_from_path("/"), "");
        assert_eq!(channel_from_path(""), "");
        assert_eq!(channel_from_path("/ws/a/b"), "b");
    }

    #[test]
    fn frame_fans_out_to_other_members_only() {
        let (_, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");
        open(&mut driver, 2, "/ws/x");
        open(&mut driver, 3, "/ws/x");
        open(&mut driver, 4, "/ws/y");

        let frame = Frame::Text("F".to_string());
        let actions = driver
            .process_event(RelayEvent::FrameReceived { socket_id: 1, frame: frame.clone() })
            .unwrap();

        assert_eq!(deliveries(&actions), vec![(2, frame.clone()), (3, frame)]);
    }

    #[test]
    fn binary_frames_are_relayed_verbatim() {
        let (_, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");
        open(&mut driver, 2, "/ws/x");

        let frame = Frame::Binary(Bytes::from_static(&[0xff, 0x00, 0x7f]));
        let actions = driver
            .process_event(RelayEvent::FrameReceived { socket_id: 1, frame: frame.clone() })
            .unwrap();

        assert_eq!(deliveries(&actions), vec![(2, frame)]);
    }

    #[test]
    fn frame_from_unknown_socket_is_an_error() {
        let (_, mut driver) = driver();

        let result = driver.process_event(RelayEvent::FrameReceived {
            socket_id: 9,
            frame: Frame::Text(String::new()),
        });

        assert_eq!(result, Err(DriverError::SocketNotFound(9)));
    }

    #[test]
    fn duplicate_socket_id_is_refused() {
        let (_, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");

        let result = driver
            .process_event(RelayEvent::SocketOpened { socket_id: 1, path: "/ws/y".to_string() });

        assert_eq!(result, Err(DriverError::SocketAlreadyExists(1)));
        assert_eq!(driver.channel_of(1), Some("x"));
    }

    #[test]
    fn connection_limit_closes_new_sockets() {
        let env = MockEnv::new();
        let mut driver =
            RelayDriver::new(env, RelayConfig { max_connections: 1, ..RelayConfig::default() });
        open(&mut driver, 1, "/ws/x");

        let actions = driver
            .process_event(RelayEvent::SocketOpened { socket_id: 2, path: "/ws/x".to_string() })
            .unwrap();

        assert!(actions.iter().any(|a| matches!(a, RelayAction::Close { socket_id: 2, .. })));
        assert_eq!(driver.socket_count(), 1);
    }

    #[test]
    fn closing_last_socket_deletes_channel() {
        let (_, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");

        driver
            .process_event(RelayEvent::SocketClosed { socket_id: 1, reason: "bye".to_string() })
            .unwrap();

        assert_eq!(driver.channel_count(), 0);
        let again = driver
            .process_event(RelayEvent::SocketClosed { socket_id: 1, reason: "bye".to_string() })
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn tick_before_interval_does_nothing() {
        let (env, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");

        env.advance(Duration::from_secs(29));

        assert!(driver.process_event(RelayEvent::Tick).unwrap().is_empty());
    }

    #[test]
    fn silent_socket_is_terminated_on_second_sweep() {
        let (env, mut driver) = driver();
        open(&mut driver, 1, "/ws/x");
        open(&mut driver, 2, "/ws/x");

        env.advance(Duration::from_secs(30));
        let first = driver.process_event(RelayEvent::Tick).unwrap();
        assert_eq!(
            first,
            vec![RelayAction::Ping { socket_id: 1 }, RelayAction::Ping { socket_id: 2 }]
        );

        driver.process_event(RelayEvent::PongReceived { socket_id: 2 }).unwrap();

        env.advance(Duration::from_secs(30));
        let second = driver.process_event(RelayEvent::Tick).unwrap();
        assert!(second.contains(&RelayAction::Close {
            socket_id: 1,
            reason: "ping timeout".to_string()
        }));
        assert!(second.contains(&RelayAction::Ping { socket_id: 2 }));
        assert_eq!(driver.sockets_in_channel("x").collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn pong_from_unknown_socket_is_an_error() {
        let (_, mut driver) = driver();

        assert_eq!(
            driver.process_event(RelayEvent::PongReceived { socket_id: 5 }),
            Err(DriverError::SocketNotFound(5))
        );
    }
}
