//! Shared test support: an in-memory transport the tests drive by hand.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use parley_sdk::config::{Platform, SessionConfig};
use parley_sdk::event::{LinkEvent, UserIdentity};
use parley_sdk::session::SessionHandle;
use parley_sdk::storage::{MemoryStorage, SessionStorage};
use parley_sdk::transport::{Connector, OpenedLink, TransportLink};

/// One scripted link. Tests flip its connectivity and inject events.
pub struct MockLink {
    pub identity: UserIdentity,
    connected: AtomicBool,
    closed: AtomicBool,
    auto_reconnect: AtomicBool,
    emitted: Mutex<Vec<(String, Value)>>,
    reconnect_requests: AtomicUsize,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
}

impl MockLink {
    /// Bring the link up and tell the manager.
    pub fn go_up(&self) {
        self.connected.store(true, Ordering::Release);
        let _ = self.events_tx.send(LinkEvent::Up);
    }

    /// Drop the link and tell the manager.
    pub fn go_down(&self, reason: &str) {
        self.connected.store(false, Ordering::Release);
        let _ = self.events_tx.send(LinkEvent::Down {
            reason: reason.to_string(),
        });
    }

    /// Inject an arbitrary link event.
    pub fn send(&self, event: LinkEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted.lock().clone()
    }

    pub fn emitted_names(&self) -> Vec<String> {
        self.emitted.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn emitted_payload(&self, event: &str) -> Option<Value> {
        self.emitted
            .lock()
            .iter()
            .find(|(n, _)| n == event)
            .map(|(_, p)| p.clone())
    }

    pub fn count_emitted(&self, event: &str) -> usize {
        self.emitted.lock().iter().filter(|(n, _)| n == event).count()
    }

    pub fn clear_emitted(&self) {
        self.emitted.lock().clear();
    }

    pub fn reconnect_requests(&self) -> usize {
        self.reconnect_requests.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl TransportLink for MockLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: &str, payload: Value) {
        self.emitted.lock().push((event.to_string(), payload));
    }

    fn request_reconnect(&self) {
        self.reconnect_requests.fetch_add(1, Ordering::AcqRel);
        if self.auto_reconnect.load(Ordering::Acquire) && !self.is_closed() {
            self.go_up();
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.connected.store(false, Ordering::Release);
    }
}

/// Connector handing out [`MockLink`]s, remembering every one it made.
pub struct MockConnector {
    links: Mutex<Vec<Arc<MockLink>>>,
    connect_immediately: AtomicBool,
    auto_reconnect: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(Vec::new()),
            connect_immediately: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(false),
        })
    }

    /// Links opened after this report up as soon as they are created.
    pub fn set_connect_immediately(&self, on: bool) {
        self.connect_immediately.store(on, Ordering::Release);
    }

    /// Links opened after this reconnect as soon as they are asked to.
    pub fn set_auto_reconnect(&self, on: bool) {
        self.auto_reconnect.store(on, Ordering::Release);
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }

    pub fn link(&self, index: usize) -> Arc<MockLink> {
        Arc::clone(&self.links.lock()[index])
    }

    pub fn last_link(&self) -> Arc<MockLink> {
        Arc::clone(self.links.lock().last().expect("no link opened yet"))
    }
}

impl Connector for MockConnector {
    fn open(&self, identity: &UserIdentity) -> OpenedLink {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = Arc::new(MockLink {
            identity: identity.clone(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(self.auto_reconnect.load(Ordering::Acquire)),
            emitted: Mutex::new(Vec::new()),
            reconnect_requests: AtomicUsize::new(0),
            events_tx,
        });
        if self.connect_immediately.load(Ordering::Acquire) {
            link.go_up();
        }
        self.links.lock().push(Arc::clone(&link));
        OpenedLink {
            link,
            events: events_rx,
        }
    }
}

/// Spawn a session manager against a mock connector and memory storage.
pub fn session(platform: Platform) -> (Arc<MockConnector>, Arc<MemoryStorage>, SessionHandle) {
    let connector = MockConnector::new();
    let storage = Arc::new(MemoryStorage::new());
    let config = SessionConfig::new("127.0.0.1:0", platform);
    let connector_dyn: Arc<dyn Connector> = connector.clone();
    let storage_dyn: Arc<dyn SessionStorage> = storage.clone();
    let handle = parley_sdk::session::spawn(config, connector_dyn, storage_dyn);
    (connector, storage, handle)
}

/// Let the dispatch loop drain everything queued so far.
///
/// Under a paused clock the sleep completes as soon as every task is
/// idle, so this is a deterministic settling point, not a real delay.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
