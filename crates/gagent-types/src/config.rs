//! Runtime configuration options recognized by the engine, all with
//! documented defaults. Loading these from a file or environment is out of
//! scope for this crate; callers populate a [`RuntimeConfig`] however suits
//! their deployment (e.g. `serde_json`/`serde_yaml` over their own config
//! file) and hand it to the runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of confirmed events between snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 100;

/// Default maximum number of entries retained in a per-agent dedup window.
pub const DEFAULT_DEDUP_MAX_ENTRIES: usize = 10_000;

/// Default expiration for a dedup window entry.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(5 * 60);

/// Default maximum number of events read per replay page.
pub const DEFAULT_MAX_REPLAY_BATCH: usize = 1000;

/// Tunables for one running engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of confirmed events between automatic snapshots.
    pub snapshot_interval: u64,
    /// Maximum number of entries in a per-agent dedup window.
    pub dedup_max_entries: usize,
    /// Expiration for dedup window entries.
    #[serde(with = "humantime_serde_duration")]
    pub dedup_ttl: Duration,
    /// Bounded mailbox/stream capacity; `None` means unbounded.
    pub mailbox_capacity: Option<usize>,
    /// Whether handlers that raise events auto-confirm at the end of
    /// envelope processing.
    pub auto_confirm_events: bool,
    /// Maximum number of events fetched per repository call during replay.
    pub max_replay_batch: usize,
    /// Whether an unresolvable `type_url` encountered during replay is
    /// skipped with a warning (`true`) or aborts activation (`false`).
    pub allow_unknown_on_replay: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            dedup_max_entries: DEFAULT_DEDUP_MAX_ENTRIES,
            dedup_ttl: DEFAULT_DEDUP_TTL,
            mailbox_capacity: None,
            auto_confirm_events: true,
            max_replay_batch: DEFAULT_MAX_REPLAY_BATCH,
            allow_unknown_on_replay: true,
        }
    }
}

/// Minimal `Duration <-> seconds` serde shim so `RuntimeConfig` stays
/// `serde`-roundtrippable without pulling in a dedicated duration-format
/// crate for a single field.
mod humantime_serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.snapshot_interval, 100);
        assert_eq!(cfg.dedup_max_entries, 10_000);
        assert_eq!(cfg.dedup_ttl, Duration::from_secs(300));
        assert_eq!(cfg.mailbox_capacity, None);
        assert!(cfg.auto_confirm_events);
        assert_eq!(cfg.max_replay_batch, 1000);
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
