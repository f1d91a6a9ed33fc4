//! Bounded, TTL-expiring set of recently-seen event ids.
//!
//! This is the only defense against cycles in `Up`/`Down`/`Both`
//! propagation (see [`crate::SubscriptionManager`]'s module docs) and
//! against re-delivery under at-least-once replay. Each agent owns its
//! own deduplicator; it is never shared across agents or tasks, so no
//! internal locking is needed.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Per-agent bounded, time-limited set of seen event ids.
///
/// Entries are evicted either because they have aged past `expiration`
/// (checked lazily, swept on each call) or because `max_entries` was
/// exceeded, in which case the oldest entry is dropped regardless of
/// age.
pub struct EventDeduplicator {
    max_entries: usize,
    expiration: Duration,
    seen_at: HashMap<Uuid, Instant>,
    order: VecDeque<Uuid>,
    duplicates_dropped: u64,
}

impl EventDeduplicator {
    /// Create a deduplicator with the given window parameters.
    pub fn new(max_entries: usize, expiration: Duration) -> Self {
        Self {
            max_entries,
            expiration,
            seen_at: HashMap::new(),
            order: VecDeque::new(),
            duplicates_dropped: 0,
        }
    }

    /// Mark `event_id` as seen. Returns `true` the first time an id is
    /// observed within the current window, `false` on every subsequent
    /// call for the same id until it has been evicted.
    pub fn try_mark_seen(&mut self, event_id: Uuid) -> bool {
        self.sweep_expired();

        if self.seen_at.contains_key(&event_id) {
            self.duplicates_dropped += 1;
            return false;
        }

        self.seen_at.insert(event_id, Instant::now());
        self.order.push_back(event_id);
        self.evict_over_capacity();
        true
    }

    /// Number of duplicates dropped since creation, for monitoring.
    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped
    }

    /// Current number of entries held in the window.
    pub fn len(&self) -> usize {
        self.seen_at.len()
    }

    /// Whether the window currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.seen_at.is_empty()
    }

    fn sweep_expired(&mut self) {
        let now = Instant::now();
        while let Some(&front) = self.order.front() {
            match self.seen_at.get(&front) {
                Some(&inserted) if now.duration_since(inserted) >= self.expiration => {
                    self.order.pop_front();
                    self.seen_at.remove(&front);
                }
                _ => break,
            }
        }
    }

    fn evict_over_capacity(&mut self) {
        while self.seen_at.len() > self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                self.seen_at.remove(&oldest);
            } else {
                break;
            }
        }
    }
}
