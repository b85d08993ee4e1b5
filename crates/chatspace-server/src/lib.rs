//! Chatspace relay server.
//!
//! Production relay using tokio-tungstenite for WebSocket transport, Tokio for
//! the async runtime, and system time with OS randomness.
//!
//! # Architecture
//!
//! This crate provides production "glue" that wraps a Sans-IO
//! [`RelayDriver`] with real I/O. The driver decides who receives which
//! frame and which sockets are dead; [`Server`] executes those actions on
//! live sockets.
//!
//! The relay never decodes frames. Room confidentiality rests entirely on the
//! envelopes the clients exchange.
//!
//! # Components
//!
//! - [`RelayDriver`]: Action-based relay logic (pure logic, no I/O)
//! - [`ChannelRegistry`]: Channel membership and liveness flags
//! - [`Server`]: Production runtime that executes driver actions
//! - [`SystemEnv`]: Production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod registry;
mod server_error;
mod system_env;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use chatspace_core::Environment;
pub use driver::{
    Frame, LogLevel, RelayAction, RelayConfig, RelayDriver, RelayEvent, channel_from_path,
};
pub use error::ServerError;
use futures_util::{SinkExt, StreamExt};
pub use registry::{ChannelRegistry, LivenessSweep, SocketInfo};
pub use server_error::DriverError;
pub use system_env::SystemEnv;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, Notify, RwLock, mpsc},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{ErrorResponse, Request, Response},
    },
};

/// Outbound frames buffered per socket before sends start failing.
const OUTBOUND_BUFFER: usize = 256;

/// Longest gap between driver ticks.
const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime handle for one live socket.
struct SocketHandle {
    /// Outbound queue drained by the socket task
    outbound: mpsc::Sender<Message>,
    /// Wakes the socket task to terminate without a close handshake
    kill: Arc<Notify>,
}

/// Shared state for all connections.
struct SharedState {
    /// Map of socket ID to its handle
    sockets: RwLock<HashMap<u64, SocketHandle>>,
}

type SharedDriver = Arc<Mutex<RelayDriver<SystemEnv>>>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8081")
    pub bind_address: String,
    /// Driver configuration (ping interval, limits)
    pub driver: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:8081".to_string(), driver: RelayConfig::default() }
    }
}

/// Production chatspace relay.
///
/// Wraps `RelayDriver` with a TCP listener and system environment.
pub struct Server {
    /// The action-based relay driver
    driver: RelayDriver<SystemEnv>,
    /// TCP listener accepting WebSocket upgrades
    listener: TcpListener,
    /// Environment
    env: SystemEnv,
}

impl Server {
    /// Bind the listener.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = RelayDriver::new(env.clone(), config.driver);

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|source| ServerError::Bind { address: config.bind_address.clone(), source })?;

        Ok(Self { driver, listener, env })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::Listener)
    }

    /// Run the relay, accepting sockets and relaying frames.
    ///
    /// Runs until the future is dropped. The liveness ticker is polled by this
    /// same future and stops with it.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Relay listening on {}", self.local_addr()?);

        let tick_interval = self.driver.config().ping_interval.min(MAX_TICK_INTERVAL);
        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState { sockets: RwLock::new(HashMap::new()) });

        let ticker = run_ticker(Arc::clone(&driver), Arc::clone(&shared), tick_interval);
        let acceptor = accept_loop(self.listener, self.env, driver, shared);
        tokio::select! {
            () = ticker => {},
            () = acceptor => {},
        }

        Ok(())
    }
}

/// Accept TCP connections and hand each one to its own socket task.
async fn accept_loop(
    listener: TcpListener,
    env: SystemEnv,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);
                let socket_id = env.random_u64();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket_id, stream, driver, shared).await {
                        tracing::debug!(%peer, "Connection error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            },
        }
    }
}

/// Feed periodic ticks to the driver so liveness sweeps run on schedule.
async fn run_ticker(driver: SharedDriver, shared: Arc<SharedState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        dispatch(&driver, &shared, RelayEvent::Tick).await;
    }
}

/// Handle a single TCP connection from upgrade to close.
async fn handle_connection(
    socket_id: u64,
    stream: TcpStream,
    driver: SharedDriver,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let mut path = String::new();
    let record_path =
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            path = request.uri().path().to_string();
            Ok(response)
        };
    let ws = accept_hdr_async(stream, record_path).await?;

    tracing::debug!("New socket {} on {}", socket_id, path);

    let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
    let kill = Arc::new(Notify::new());
    {
        let mut sockets = shared.sockets.write().await;
        sockets.insert(socket_id, SocketHandle { outbound: outbound_tx, kill: Arc::clone(&kill) });
    }

    dispatch(&driver, &shared, RelayEvent::SocketOpened { socket_id, path }).await;

    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            () = kill.notified() => break "terminated".to_string(),
            outgoing = outbound_rx.recv() => {
                let Some(message) = outgoing else {
                    break "outbound queue closed".to_string();
                };
                if let Err(e) = sink.send(message).await {
                    break format!("send failed: {e}");
                }
            }
            incoming = stream.next() => {
                let event = match incoming {
                    Some(Ok(Message::Text(text))) => RelayEvent::FrameReceived {
                        socket_id,
                        frame: Frame::Text(text.as_str().to_string()),
                    },
                    Some(Ok(Message::Binary(bytes))) => RelayEvent::FrameReceived {
                        socket_id,
                        frame: Frame::Binary(bytes),
                    },
                    Some(Ok(Message::Pong(_))) => RelayEvent::PongReceived { socket_id },
                    // Pings are answered by the WebSocket layer.
                    Some(Ok(Message::Ping(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) => break "closed by peer".to_string(),
                    Some(Err(e)) => break format!("receive failed: {e}"),
                    None => break "stream ended".to_string(),
                };
                dispatch(&driver, &shared, event).await;
            }
        }
    };

    shared.sockets.write().await.remove(&socket_id);
    dispatch(&driver, &shared, RelayEvent::SocketClosed { socket_id, reason }).await;

    Ok(())
}

/// Run one event through the driver and execute the resulting actions.
///
/// Driver errors concern a single socket and are logged, never propagated.
async fn dispatch(driver: &SharedDriver, shared: &SharedState, event: RelayEvent) {
    let result = driver.lock().await.process_event(event);
    match result {
        Ok(actions) => execute_actions(actions, shared).await,
        Err(e) => tracing::warn!("Relay event error: {}", e),
    }
}

/// Execute relay actions.
///
/// Sends never wait on a slow receiver: a full or closed queue is logged and
/// the remaining receivers are still served.
async fn execute_actions(actions: Vec<RelayAction>, shared: &SharedState) {
    for action in actions {
        match action {
            RelayAction::Deliver { socket_id, frame } => {
                let message = match frame {
                    Frame::Text(text) => Message::text(text),
                    Frame::Binary(bytes) => Message::Binary(bytes),
                };
                send_to_socket(shared, socket_id, message).await;
            },

            RelayAction::Ping { socket_id } => {
                send_to_socket(shared, socket_id, Message::Ping(Bytes::new())).await;
            },

            RelayAction::Close { socket_id, reason } => {
                tracing::info!("Closing socket {}: {}", socket_id, reason);
                let mut sockets = shared.sockets.write().await;
                if let Some(handle) = sockets.remove(&socket_id) {
                    handle.kill.notify_one();
                }
            },

            RelayAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

async fn send_to_socket(shared: &SharedState, socket_id: u64, message: Message) {
    let sockets = shared.sockets.read().await;
    match sockets.get(&socket_id) {
        Some(handle) => {
            if let Err(e) = handle.outbound.try_send(message) {
                tracing::warn!("Send to socket {} failed: {}", socket_id, e);
            }
        },
        None => tracing::debug!("Send to socket {}: socket gone", socket_id),
    }
}
