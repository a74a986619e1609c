//! Realtime session SDK for mobile chat clients.
//!
//! The centerpiece is the session connection manager ([`session`]): it
//! owns the one live link to the chat backend, keeps it alive across
//! foreground/background transitions, queues outgoing events while
//! offline, and resynchronizes room state after a reconnect. The UI
//! layer talks to it through a [`SessionHandle`] and renders from the
//! shared [`ChatStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley_sdk::{AppLifecycle, Platform, SessionConfig};
//! use parley_sdk::storage::FileStorage;
//! use parley_sdk::transport::TcpConnector;
//!
//! # async fn run() {
//! let config = SessionConfig::new("chat.example.com:4680", Platform::Android);
//! let connector = Arc::new(TcpConnector::new(
//!     config.endpoint.clone(),
//!     config.namespace.clone(),
//! ));
//! let storage = Arc::new(FileStorage::open_default());
//! let session = parley_sdk::session::spawn(config, connector, storage);
//!
//! session.init(42, "alice");
//! session.queue_message("chat:send", serde_json::json!({ "text": "hi" }));
//! session.notify_lifecycle(AppLifecycle::Background);
//! # }
//! ```
//!
//! The manager never reports errors to its callers, because the app
//! must stay usable fully offline. Every operation resolves to logging
//! plus store state, and supervision retries in the background.

pub mod config;
pub mod event;
pub mod queue;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;

pub use config::{Platform, SessionConfig};
pub use event::{DirectMessage, DirectMessageEcho, LinkEvent, RoomMessage, UserIdentity};
pub use session::{AppLifecycle, SessionHandle};
pub use store::{ChatStore, ConnectionState, UserKind};
