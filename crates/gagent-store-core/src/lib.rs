#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-store-core** – Pluggable persistence contracts for
//! gagent-runtime.
//!
//! This crate defines the [`EventRepository`] and [`SnapshotStore`]
//! traits that every storage backend (sled, SQL, a managed document
//! store, or the in-memory driver in `gagent-store-memory`) must
//! implement. It carries no concrete backend of its own — only the
//! contract, plus the few helpers (`page` math) that every backend needs
//! identically.

use async_trait::async_trait;
use gagent_types::{AgentId, Snapshot, StateEventRecord, Version};

pub mod error;
pub use error::StoreError;

/// Append-only, versioned per-agent event log, plus snapshot storage.
///
/// Implementations must deliver the query complexities the spec implies
/// even though it does not mandate a specific index schema: O(log n)
/// version lookup and O(k) range reads. A composite unique index on
/// `(agent_id, version)` with secondary indexes on `timestamp` and
/// `event_type` is the recommended on-disk layout (spec §4.6); an
/// in-memory backend naturally gets the same complexities from a sorted
/// per-agent vector or B-tree.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Atomically append `events` to `agent_id`'s log.
    ///
    /// `expected_version` must equal the stored tip version or the call
    /// fails with [`StoreError::ConcurrencyConflict`] and appends
    /// nothing. On success, each event in `events` is assigned
    /// `expected_version + 1, expected_version + 2, ...` in order, and
    /// the new tip version is returned.
    async fn append_events(
        &self,
        agent_id: AgentId,
        events: Vec<StateEventRecord>,
        expected_version: Version,
    ) -> Result<Version, StoreError>;

    /// Fetch events for `agent_id` ordered by version ascending.
    ///
    /// `from_version` and `to_version` are inclusive bounds; omitting
    /// both returns the full log. `max_count`, if given, caps the number
    /// of events returned (used by paged replay, see
    /// `RuntimeConfig::max_replay_batch`). Calling this on an agent with
    /// no events, or with a `from_version` past the tip, returns an
    /// empty sequence rather than an error.
    async fn get_events(
        &self,
        agent_id: AgentId,
        from_version: Option<Version>,
        to_version: Option<Version>,
        max_count: Option<usize>,
    ) -> Result<Vec<StateEventRecord>, StoreError>;

    /// Current tip version for `agent_id`. Returns `0` if the agent has
    /// no events.
    async fn get_latest_version(&self, agent_id: AgentId) -> Result<Version, StoreError>;

    /// Truncate all events strictly older than `version` for `agent_id`.
    /// Idempotent: truncating an already-truncated range is a no-op, not
    /// an error. Callers are responsible for only truncating below a
    /// version a snapshot already covers (spec invariant: `Snapshot.version
    /// <= latest event.version` at all times, and truncation must not
    /// invalidate that).
    async fn delete_events_below_version(
        &self,
        agent_id: AgentId,
        version: Version,
    ) -> Result<(), StoreError>;
}

/// Snapshot persistence, typically backed by the same storage engine as
/// the [`EventRepository`] it accompanies.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `snapshot`, superseding any snapshot previously stored for
    /// the same agent.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError>;

    /// Fetch the most recent snapshot for `agent_id`, if one has ever
    /// been written.
    async fn get_latest_snapshot(&self, agent_id: AgentId) -> Result<Option<Snapshot>, StoreError>;
}

/// Convenience bound for backends that implement both halves of the
/// persistence contract, which is the common case for a single storage
/// engine backing both events and snapshots.
pub trait PersistenceBackend: EventRepository + SnapshotStore {}
impl<T> PersistenceBackend for T where T: EventRepository + SnapshotStore {}
