//! Events delivered by a transport link to the session manager.
//!
//! Wire payloads use camelCase field names to match the server's event
//! schema; unknown fields are ignored so the client tolerates additive
//! server changes.

use serde::{Deserialize, Serialize};

/// The user identity a session is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: u64,
    pub username: String,
}

impl UserIdentity {
    pub fn new(user_id: u64, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// An inbound direct message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    /// Server-assigned message id. A fallback id is generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub from_user_id: u64,
    #[serde(default)]
    pub from_username: Option<String>,
    #[serde(default)]
    pub from_role: Option<String>,
    pub to_user_id: u64,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message_color: Option<String>,
}

/// Server echo of a direct message we sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageEcho {
    #[serde(default)]
    pub id: Option<String>,
    pub to_user_id: u64,
    #[serde(default)]
    pub to_username: Option<String>,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A message delivered in a room the client is joined to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: String,
    pub room_id: String,
    pub user_id: u64,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Events a transport link pushes to the session manager.
///
/// The manager tags each event with the generation of the link that
/// produced it and discards events from superseded links before they can
/// touch any state.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// The link is up and can carry events.
    Up,
    /// The link dropped; the transport will retry on its own.
    Down { reason: String },
    /// A connection attempt failed; the transport will retry on its own.
    ConnectError { message: String },
    /// The server replaced this session with a newer one. Terminal for
    /// this link; reconnecting would fight the single-session policy.
    SessionReplaced,
    /// A direct message addressed to some user on this device.
    DirectMessage(DirectMessage),
    /// Echo of a direct message sent from this device.
    DirectMessageEcho(DirectMessageEcho),
    /// A message in a joined room.
    RoomMessage(RoomMessage),
}
