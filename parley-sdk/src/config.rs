//! Session configuration and platform power profiles.
//!
//! Mobile platforms differ in how aggressively they suspend network
//! sockets in the background. The timings below are tuned per platform:
//! aggressive platforms get a shorter heartbeat and an extra
//! background-retry timer, plus a much lower re-auth threshold because
//! their sessions go stale quickly.

use std::time::Duration;

/// Platform the client is running on.
///
/// Drives heartbeat cadence, background reconnect supervision, and the
/// re-auth threshold after a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Suspends background sockets aggressively.
    Android,
    /// Keeps sockets alive longer in the background.
    Ios,
    /// No background suspension to speak of.
    Desktop,
}

impl Platform {
    /// Whether the platform tears down background sockets aggressively
    /// enough to warrant a dedicated background-retry timer.
    pub fn aggressive_background(self) -> bool {
        matches!(self, Platform::Android)
    }
}

/// Configuration for a session connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server endpoint (host:port).
    pub endpoint: String,
    /// Event namespace on the server (e.g. "/chat").
    pub namespace: String,
    /// Platform profile.
    pub platform: Platform,
    /// Liveness ping period.
    pub heartbeat_period: Duration,
    /// Background reconnect-retry period (aggressive platforms only).
    pub background_retry_period: Duration,
    /// Background duration beyond which a resume triggers re-auth + resync.
    pub reauth_threshold: Duration,
    /// How long a foreground reconnect may take before we recreate the link.
    pub reconnect_wait: Duration,
    /// How long a forced recreate may take before we give up on it.
    pub recreate_wait: Duration,
    /// Message count requested from a post-resume sync.
    pub sync_fetch_limit: u32,
}

impl SessionConfig {
    /// Config with platform-tuned defaults.
    pub fn new(endpoint: impl Into<String>, platform: Platform) -> Self {
        let aggressive = platform.aggressive_background();
        Self {
            endpoint: endpoint.into(),
            namespace: "/chat".to_string(),
            platform,
            heartbeat_period: if aggressive {
                Duration::from_secs(8)
            } else {
                Duration::from_secs(15)
            },
            background_retry_period: Duration::from_secs(15),
            reauth_threshold: if aggressive {
                Duration::from_secs(5)
            } else {
                Duration::from_secs(30)
            },
            reconnect_wait: Duration::from_secs(5),
            recreate_wait: Duration::from_secs(8),
            sync_fetch_limit: 200,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:4680", Platform::Desktop)
    }
}
