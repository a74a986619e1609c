//! Transport abstraction and the stock TCP transport.
//!
//! The session manager does not speak a wire protocol. It drives a
//! [`TransportLink`]: a bidirectional event channel that carries named
//! events with JSON payloads and reconnects on its own. The manager
//! supervises the link (heartbeat, background retry, forced recreate)
//! but never implements framing or handshakes itself.
//!
//! [`TcpConnector`] is the stock implementation: newline-delimited JSON
//! envelopes over TCP, reconnecting forever with exponential backoff
//! (1s doubling to a 30s cap, reset after a successful connect).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};

use crate::event::{DirectMessage, DirectMessageEcho, LinkEvent, RoomMessage, UserIdentity};

/// Errors from the stock transport's wire handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A line was not a valid event envelope.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] serde_json::Error),
    /// The envelope named an event this client does not handle.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}

/// One live bidirectional link to the server.
///
/// All methods are non-blocking. `emit` hands the event to the
/// transport's own buffering; delivery is best-effort.
pub trait TransportLink: Send + Sync {
    fn is_connected(&self) -> bool;
    /// Send a named event with a JSON payload.
    fn emit(&self, event: &str, payload: Value);
    /// Nudge the transport's built-in reconnect. No-op while connected
    /// or already retrying.
    fn request_reconnect(&self);
    /// Permanently close the link. No further reconnect attempts.
    fn close(&self);
}

/// Factory for transport links.
pub trait Connector: Send + Sync {
    fn open(&self, identity: &UserIdentity) -> OpenedLink;
}

/// A freshly opened link plus the channel its events arrive on.
pub struct OpenedLink {
    pub link: Arc<dyn TransportLink>,
    pub events: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Wire envelope: one JSON object per line, both directions.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode one wire line into a link event.
fn decode_line(line: &str) -> Result<LinkEvent, TransportError> {
    let envelope: Envelope = serde_json::from_str(line)?;
    match envelope.event.as_str() {
        "dm:receive" => Ok(LinkEvent::DirectMessage(serde_json::from_value::<
            DirectMessage,
        >(envelope.data)?)),
        "dm:sent" => Ok(LinkEvent::DirectMessageEcho(serde_json::from_value::<
            DirectMessageEcho,
        >(envelope.data)?)),
        "room:message" => Ok(LinkEvent::RoomMessage(serde_json::from_value::<RoomMessage>(
            envelope.data,
        )?)),
        "session:replaced" => Ok(LinkEvent::SessionReplaced),
        other => Err(TransportError::UnknownEvent(other.to_string())),
    }
}

fn encode_line(event: &str, payload: &Value) -> Result<String, TransportError> {
    let mut line = serde_json::to_string(&Envelope {
        event: event.to_string(),
        data: payload.clone(),
    })?;
    line.push('\n');
    Ok(line)
}

const RECONNECT_INITIAL: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(RECONNECT_MAX)
}

/// TCP connector: JSON lines over a plain socket, auto-reconnecting.
pub struct TcpConnector {
    addr: String,
    namespace: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            namespace: namespace.into(),
        }
    }
}

impl Connector for TcpConnector {
    fn open(&self, identity: &UserIdentity) -> OpenedLink {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(LinkShared {
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wake: Notify::new(),
        });

        tokio::spawn(run_link(
            self.addr.clone(),
            self.namespace.clone(),
            identity.clone(),
            Arc::clone(&shared),
            outgoing_rx,
            event_tx,
        ));

        OpenedLink {
            link: Arc::new(TcpLink {
                shared,
                outgoing: outgoing_tx,
            }),
            events: event_rx,
        }
    }
}

struct LinkShared {
    connected: AtomicBool,
    closed: AtomicBool,
    wake: Notify,
}

struct TcpLink {
    shared: Arc<LinkShared>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl TransportLink for TcpLink {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: &str, payload: Value) {
        match encode_line(event, &payload) {
            Ok(line) => {
                let _ = self.outgoing.send(line);
            }
            Err(e) => tracing::warn!(event, error = %e, "dropping unencodable event"),
        }
    }

    fn request_reconnect(&self) {
        self.shared.wake.notify_one();
    }

    fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

/// Connection supervisor: connect, pump, back off, repeat until closed.
async fn run_link(
    addr: String,
    namespace: String,
    identity: UserIdentity,
    shared: Arc<LinkShared>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let mut backoff = RECONNECT_INITIAL;

    loop {
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                tracing::debug!(addr, "transport connected");
                shared.connected.store(true, Ordering::Release);
                let _ = events.send(LinkEvent::Up);

                let reason = drive(stream, &namespace, &identity, &shared, &mut outgoing, &events)
                    .await;

                shared.connected.store(false, Ordering::Release);
                if shared.closed.load(Ordering::Acquire) {
                    break;
                }
                tracing::debug!(addr, reason, "transport disconnected");
                let _ = events.send(LinkEvent::Down { reason });
                backoff = RECONNECT_INITIAL;
            }
            Err(e) => {
                tracing::debug!(addr, error = %e, "transport connect failed");
                let _ = events.send(LinkEvent::ConnectError {
                    message: e.to_string(),
                });
            }
        }

        // Sleep out the backoff; request_reconnect/close cut it short.
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shared.wake.notified() => {}
        }
        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        backoff = next_backoff(backoff);
    }
    tracing::debug!(addr, "transport closed");
}

/// Pump one established connection. Returns the disconnect reason.
async fn drive(
    stream: TcpStream,
    namespace: &str,
    identity: &UserIdentity,
    shared: &LinkShared,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> String {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    // Announce ourselves: namespace plus connection-time auth context.
    let hello = json!({
        "namespace": namespace,
        "userId": identity.user_id,
        "username": identity.username,
    });
    match encode_line("hello", &hello) {
        Ok(text) => {
            if writer.write_all(text.as_bytes()).await.is_err() {
                return "hello write failed".to_string();
            }
        }
        Err(e) => return format!("hello encode failed: {e}"),
    }

    loop {
        tokio::select! {
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => return "eof".to_string(),
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        if !trimmed.is_empty() {
                            match decode_line(trimmed) {
                                Ok(event) => {
                                    if events.send(event).is_err() {
                                        return "consumer gone".to_string();
                                    }
                                }
                                Err(TransportError::UnknownEvent(name)) => {
                                    tracing::trace!(event = name, "ignoring unknown event");
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "bad envelope from server");
                                }
                            }
                        }
                        line.clear();
                    }
                    Err(e) => return e.to_string(),
                }
            }
            maybe = outgoing.recv() => {
                match maybe {
                    Some(text) => {
                        if writer.write_all(text.as_bytes()).await.is_err() {
                            return "write failed".to_string();
                        }
                    }
                    None => return "link handle dropped".to_string(),
                }
            }
            _ = shared.wake.notified() => {
                if shared.closed.load(Ordering::Acquire) {
                    return "closed".to_string();
                }
                // Reconnect requests are a no-op while connected.
            }
        }
    }
}
