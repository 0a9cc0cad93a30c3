//! Time-bounded store of existence outcomes.

use crate::clock::{Clock, SystemClock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolgraph_model::ToolKey;
use tracing::trace;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Cache key of an existence lookup: `exists:{namespace}:{group}:{toolName}`.
pub fn existence_key(key: &ToolKey) -> String {
    format!("exists:{}:{}:{}", key.namespace, key.group, key.tool_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub outcome: bool,
    pub detail: String,
    pub captured_at: Instant,
}

/// Entries are trusted only while younger than the TTL. A stale entry is
/// dropped on lookup so the caller recomputes it.
#[derive(Debug)]
pub struct ValidationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl ValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_fresh(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;
        if now.saturating_duration_since(entry.captured_at) < self.ttl {
            return Some(entry.clone());
        }
        trace!(target: "toolgraph::validate", key, "cache entry stale");
        entries.remove(key);
        None
    }

    pub fn insert(&self, key: impl Into<String>, outcome: bool, detail: impl Into<String>) {
        let entry = CacheEntry {
            outcome,
            detail: detail.into(),
            captured_at: self.clock.now(),
        };
        self.entries.lock().insert(key.into(), entry);
    }

    /// Drop one entry; returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn key_format_matches_lookup_convention() {
        let key = ToolKey::new("n1", "g1", "tool1");
        assert_eq!(existence_key(&key), "exists:n1:g1:tool1");
    }

    #[test]
    fn entry_is_fresh_inside_window_and_dropped_after() {
        let clock = Arc::new(ManualClock::new());
        let cache = ValidationCache::with_clock(DEFAULT_TTL, clock.clone());
        cache.insert("exists:a:b:c", false, "not found");

        clock.advance(Duration::from_secs(29));
        assert_eq!(cache.get_fresh("exists:a:b:c").map(|e| e.outcome), Some(false));

        clock.advance(Duration::from_secs(1));
        assert!(cache.get_fresh("exists:a:b:c").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn reinsert_refreshes_capture_time() {
        let clock = Arc::new(ManualClock::new());
        let cache = ValidationCache::with_clock(Duration::from_secs(10), clock.clone());
        cache.insert("k", true, "found");
        clock.advance(Duration::from_secs(8));
        cache.insert("k", true, "found again");
        clock.advance(Duration::from_secs(8));

        let entry = cache.get_fresh("k").unwrap();
        assert_eq!(entry.detail, "found again");
    }
}
