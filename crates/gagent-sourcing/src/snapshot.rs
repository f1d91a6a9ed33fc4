//! Pluggable snapshot policy.

use gagent_types::Version;

/// Decides when `ConfirmEvents` should write a snapshot after applying
/// newly-persisted events.
///
/// A trait rather than a fixed interval so callers can supply a
/// time-based or hybrid strategy without touching the confirm path.
pub trait SnapshotStrategy: Send + Sync {
    /// Called once per `ConfirmEvents` call with the version range that
    /// batch just applied: `previous_version` (the tip before this
    /// batch) and `current_version` (the tip after). Both endpoints are
    /// given, not just the new tip, so a strategy like `EveryN` can
    /// detect a snapshot boundary the batch *crossed* even when the
    /// batch size doesn't evenly divide the interval — checking only
    /// `current_version` would let a multiple of `n` slip by unnoticed
    /// between two confirms. Returning `true` triggers an immediate
    /// snapshot write.
    fn should_snapshot(&self, previous_version: Version, current_version: Version) -> bool;
}

/// Snapshot every `n` confirmed events. The default strategy, matching
/// `snapshot_interval` (default 100).
#[derive(Debug, Clone, Copy)]
pub struct EveryN {
    /// Number of events between snapshots.
    pub n: Version,
}

impl EveryN {
    /// Build a strategy that snapshots every `n` events. `n == 0`
    /// never snapshots.
    pub fn new(n: Version) -> Self {
        Self { n }
    }
}

impl SnapshotStrategy for EveryN {
    fn should_snapshot(&self, previous_version: Version, current_version: Version) -> bool {
        if self.n == 0 || current_version == 0 {
            return false;
        }
        // A multiple of `n` was crossed somewhere in (previous, current]
        // even if `current_version` itself isn't one, e.g. n=5 and the
        // batch goes 3 -> 7 crosses 5 without landing on it.
        current_version / self.n > previous_version / self.n
    }
}

/// Never snapshot. Useful for tests that only care about the event log.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl SnapshotStrategy for Never {
    fn should_snapshot(&self, _previous_version: Version, _current_version: Version) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_n_fires_on_multiples_only() {
        let strategy = EveryN::new(5);
        assert!(!strategy.should_snapshot(3, 4));
        assert!(strategy.should_snapshot(4, 5));
        assert!(!strategy.should_snapshot(5, 6));
        assert!(strategy.should_snapshot(6, 10));
    }

    #[test]
    fn every_n_fires_when_a_batch_crosses_a_multiple_without_landing_on_it() {
        let strategy = EveryN::new(5);
        assert!(strategy.should_snapshot(3, 7));
        assert!(!strategy.should_snapshot(11, 14));
    }

    #[test]
    fn every_n_never_fires_at_version_zero() {
        let strategy = EveryN::new(5);
        assert!(!strategy.should_snapshot(0, 0));
    }

    #[test]
    fn never_strategy_never_fires() {
        let strategy = Never;
        assert!(!strategy.should_snapshot(0, 100));
    }
}
