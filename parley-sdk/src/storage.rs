//! Persistent key-value state that must survive process restarts.
//!
//! The session manager records the background-entry timestamp and the
//! last active room here so a resume after an OS-level kill can still
//! compute the sync delta. Writes are best-effort: storage failures are
//! logged and never surfaced to the caller.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Key for the room the UI was showing when the app left the foreground.
pub const LAST_ACTIVE_ROOM_KEY: &str = "last_active_room";
/// Key for the background-entry timestamp (epoch milliseconds).
pub const BACKGROUND_ENTERED_AT_KEY: &str = "background_entered_at";

/// Best-effort persistent key-value store.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// File-backed storage: one JSON object per app, under the user config dir.
pub struct FileStorage {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) storage at the default location,
    /// `<config dir>/parley/session-state.json`.
    pub fn open_default() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
            .join("session-state.json");
        Self::open(path)
    }

    /// Open (or create) storage at an explicit path.
    pub fn open(path: PathBuf) -> Self {
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bad session state file, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    fn persist(&self, cache: &HashMap<String, String>) {
        if let Some(dir) = self.path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match serde_json::to_string_pretty(cache) {
            Ok(raw) => {
                if let Err(e) = std::fs::write(&self.path, raw) {
                    tracing::warn!(path = %self.path.display(), error = %e, "can't persist session state");
                }
            }
            Err(e) => tracing::warn!(error = %e, "can't serialize session state"),
        }
    }
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.cache.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut cache = self.cache.lock();
        cache.insert(key.to_string(), value.to_string());
        self.persist(&cache);
    }

    fn remove(&self, key: &str) {
        let mut cache = self.cache.lock();
        if cache.remove(key).is_some() {
            self.persist(&cache);
        }
    }
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map.lock().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map.lock().remove(key);
    }
}
