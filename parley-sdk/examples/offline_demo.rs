//! Wire the session manager to the stock TCP transport and watch the
//! store. Point it at a dev server: `cargo run --example offline_demo --
//! 127.0.0.1:4680`. Messages queued while offline flush on connect.

use std::sync::Arc;
use std::time::Duration;

use parley_sdk::storage::FileStorage;
use parley_sdk::transport::TcpConnector;
use parley_sdk::{AppLifecycle, Platform, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4680".to_string());
    let config = SessionConfig::new(endpoint, Platform::Desktop);
    let connector = Arc::new(TcpConnector::new(
        config.endpoint.clone(),
        config.namespace.clone(),
    ));
    let storage = Arc::new(FileStorage::open_default());
    let session = parley_sdk::session::spawn(config, connector, storage);
    let store = session.store();

    session.init(1, "demo");
    session.queue_message(
        "chat:send",
        serde_json::json!({ "text": "hello from the offline queue" }),
    );

    // Fake one background/foreground cycle so the resync path runs.
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.notify_lifecycle(AppLifecycle::Background);
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.notify_lifecycle(AppLifecycle::Active);

    let mut changes = store.subscribe();
    loop {
        changes.changed().await?;
        println!(
            "ready={} connection={:?} conversations={}",
            session.is_ready(),
            store.connection_state(),
            store.conversation_count(),
        );
    }
}
