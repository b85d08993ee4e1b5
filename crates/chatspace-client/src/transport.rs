//! WebSocket transport for the client.
//!
//! Provides [`ConnectedClient`] which handles WebSocket I/O for a single
//! room channel. This is a thin layer that only moves text frames; protocol
//! logic remains in the Sans-IO [`crate::Client`].

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),
}

/// What the connection task reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Text frame from the relay.
    Frame(String),
    /// The socket closed. No further events follow.
    Closed {
        /// Close reason.
        reason: String,
    },
}

/// Handle to an open relay socket.
///
/// Frames are sent and received via the channels; an internal task handles
/// the WebSocket I/O.
pub struct ConnectedClient {
    /// Send text frames to the relay.
    pub to_relay: mpsc::Sender<String>,
    /// Receive frames and the final close from the relay.
    pub from_relay: mpsc::Receiver<TransportEvent>,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

/// WebSocket URL for `channel_name` on `relay_url`.
pub fn channel_url(relay_url: &str, channel_name: &str) -> String {
    format!("{}/ws/{channel_name}", relay_url.trim_end_matches('/'))
}

/// Open a socket to `channel_name` on a relay at `relay_url`
/// (`ws://host:port` or `wss://host:port`).
pub async fn connect(relay_url: &str, channel_name: &str) -> Result<ConnectedClient, TransportError> {
    let url = channel_url(relay_url, channel_name);
    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::Connection(format!("{url}: {e}")))?;

    let (to_relay_tx, to_relay_rx) = mpsc::channel::<String>(64);
    let (from_relay_tx, from_relay_rx) = mpsc::channel::<TransportEvent>(64);

    let handle = tokio::spawn(run_connection(stream, to_relay_rx, from_relay_tx));

    Ok(ConnectedClient {
        to_relay: to_relay_tx,
        from_relay: from_relay_rx,
        abort_handle: handle.abort_handle(),
    })
}

/// Bridge between the channels and the socket until either side closes.
async fn run_connection<S>(
    stream: S,
    mut to_relay: mpsc::Receiver<String>,
    from_relay: mpsc::Sender<TransportEvent>,
) where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = stream.split();

    let reason = loop {
        tokio::select! {
            outgoing = to_relay.recv() => {
                let Some(frame) = outgoing else {
                    let _ = sink.send(Message::Close(None)).await;
                    break "closed locally".to_string();
                };
                if let Err(e) = sink.send(Message::text(frame)).await {
                    break format!("send failed: {e}");
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if from_relay.send(TransportEvent::Frame(text.as_str().to_string())).await.is_err() {
                            break "receiver dropped".to_string();
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if from_relay.send(TransportEvent::Frame(text)).await.is_err() {
                                break "receiver dropped".to_string();
                            }
                        }
                        Err(_) => tracing::debug!("dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || "closed by relay".to_string(),
                            |f| format!("closed by relay: {}", f.reason.as_str()),
                        );
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => break format!("receive failed: {e}"),
                    None => break "stream ended".to_string(),
                }
            }
        }
    };

    tracing::debug!(%reason, "relay connection finished");
    let _ = from_relay.send(TransportEvent::Closed { reason }).await;
}
