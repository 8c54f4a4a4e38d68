use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory table of visitor fingerprint → last-seen instant.
///
/// Decides whether a sighting starts a new visit using a sliding window: every
/// sighting inside the window pushes the window forward. Entries are never
/// persisted; a background sweep (see [`crate::pipeline`]) drops the stale ones.
pub struct SessionTracker {
    window: Duration,
    last_seen: RwLock<HashMap<String, Instant>>,
}

impl SessionTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: RwLock::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a sighting of `fingerprint` now and report whether it starts a
    /// new visit.
    pub async fn is_new_visit(&self, fingerprint: &str) -> bool {
        self.is_new_visit_at(fingerprint, Instant::now()).await
    }

    /// Same as [`is_new_visit`](Self::is_new_visit) with an explicit clock.
    ///
    /// Check-then-update is two lock windows, not one atomic step; concurrent
    /// sightings of the same fingerprint may both report "new". Either way the
    /// stored value is `now` once the call returns.
    pub async fn is_new_visit_at(&self, fingerprint: &str, now: Instant) -> bool {
        let returning = {
            let table = self.last_seen.read().await;
            table
                .get(fingerprint)
                .is_some_and(|seen| now.saturating_duration_since(*seen) < self.window)
        };

        let mut table = self.last_seen.write().await;
        table.insert(fingerprint.to_string(), now);
        !returning
    }

    /// Drop every entry whose last sighting is a full window old. Returns the
    /// number of removed entries.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let mut table = self.last_seen.write().await;
        let before = table.len();
        table.retain(|_, seen| now.saturating_duration_since(*seen) < self.window);
        before - table.len()
    }

    pub async fn len(&self) -> usize {
        self.last_seen.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.last_seen.read().await.is_empty()
    }
}
