#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-store-memory** – In-memory persistence driver for
//! gagent-runtime.
//!
//! This crate provides a fast, non-persistent [`EventRepository`] and
//! [`SnapshotStore`] suitable for tests, local development, and
//! single-process deployments where durability is not required. All
//! data is stored in memory and lost when the process terminates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use gagent_store_core::{EventRepository, SnapshotStore, StoreError};
use gagent_types::{AgentId, Snapshot, StateEventRecord, Version};
use tokio::sync::{broadcast, RwLock};

/// Default buffer size for the live event broadcast channel.
const DEFAULT_BUFFER: usize = 1024;

/// An in-memory, non-persistent event repository and snapshot store.
///
/// Also exposes a live broadcast stream of newly-appended events for
/// callers that want to observe commits as they happen, independent of
/// the agent runtime's own stream-based routing.
#[derive(Clone)]
pub struct MemoryBackend {
    events: Arc<RwLock<HashMap<AgentId, Vec<StateEventRecord>>>>,
    snapshots: Arc<RwLock<HashMap<AgentId, Snapshot>>>,
    broadcast_tx: broadcast::Sender<StateEventRecord>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER)
    }

    /// Create a new in-memory backend with a custom broadcast buffer
    /// size for the live event stream.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(buffer_size);
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            broadcast_tx,
        }
    }

    /// Subscribe to newly-appended events across all agents.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEventRecord> {
        self.broadcast_tx.subscribe()
    }

    /// Total number of events stored across all agents.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.values().map(|v| v.len()).sum()
    }

    /// Clear all stored events and snapshots. Useful between test cases.
    pub async fn clear(&self) {
        self.events.write().await.clear();
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventRepository for MemoryBackend {
    async fn append_events(
        &self,
        agent_id: AgentId,
        mut events: Vec<StateEventRecord>,
        expected_version: Version,
    ) -> Result<Version, StoreError> {
        if events.is_empty() {
            return self.get_latest_version(agent_id).await;
        }

        let mut store = self.events.write().await;
        let log = store.entry(agent_id).or_default();
        let actual = log.last().map(|e| e.version).unwrap_or(0);

        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                agent: agent_id,
                expected: expected_version,
                actual,
            });
        }

        for (i, event) in events.iter_mut().enumerate() {
            event.version = expected_version + 1 + i as Version;
            event.agent_id = agent_id;
        }

        for event in &events {
            let _ = self.broadcast_tx.send(event.clone());
        }
        log.extend(events);

        Ok(log.last().map(|e| e.version).unwrap_or(expected_version))
    }

    async fn get_events(
        &self,
        agent_id: AgentId,
        from_version: Option<Version>,
        to_version: Option<Version>,
        max_count: Option<usize>,
    ) -> Result<Vec<StateEventRecord>, StoreError> {
        let store = self.events.read().await;
        let Some(log) = store.get(&agent_id) else {
            return Ok(Vec::new());
        };

        let from = from_version.unwrap_or(1);
        let to = to_version.unwrap_or(Version::MAX);

        let mut result: Vec<StateEventRecord> = log
            .iter()
            .filter(|e| e.version >= from && e.version <= to)
            .cloned()
            .collect();

        if let Some(max) = max_count {
            result.truncate(max);
        }

        Ok(result)
    }

    async fn get_latest_version(&self, agent_id: AgentId) -> Result<Version, StoreError> {
        let store = self.events.read().await;
        Ok(store
            .get(&agent_id)
            .and_then(|log| log.last())
            .map(|e| e.version)
            .unwrap_or(0))
    }

    async fn delete_events_below_version(
        &self,
        agent_id: AgentId,
        version: Version,
    ) -> Result<(), StoreError> {
        let mut store = self.events.write().await;
        if let Some(log) = store.get_mut(&agent_id) {
            log.retain(|e| e.version >= version);
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryBackend {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), StoreError> {
        self.snapshots.write().await.insert(snapshot.agent_id, snapshot);
        Ok(())
    }

    async fn get_latest_snapshot(&self, agent_id: AgentId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(&agent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(agent_id: AgentId, version: Version) -> StateEventRecord {
        StateEventRecord {
            event_id: Uuid::new_v4(),
            agent_id,
            version,
            timestamp: Utc::now(),
            event_type: "test.event".to_string(),
            event_data: vec![1, 2, 3],
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn append_assigns_sequential_versions() {
        let backend = MemoryBackend::new();
        let agent = AgentId::new();
        let events = vec![event(agent, 0), event(agent, 0), event(agent, 0)];

        let new_version = backend.append_events(agent, events, 0).await.unwrap();
        assert_eq!(new_version, 3);

        let stored = backend.get_events(agent, None, None, None).await.unwrap();
        assert_eq!(stored.iter().map(|e| e.version).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn append_with_stale_expected_version_conflicts() {
        let backend = MemoryBackend::new();
        let agent = AgentId::new();
        backend.append_events(agent, vec![event(agent, 0)], 0).await.unwrap();

        let err = backend.append_events(agent, vec![event(agent, 0)], 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected: 0, actual: 1, .. }
        ));
    }

    #[tokio::test]
    async fn get_events_on_empty_log_is_empty_not_error() {
        let backend = MemoryBackend::new();
        let events = backend.get_events(AgentId::new(), Some(1), None, None).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn get_latest_version_is_zero_for_unknown_agent() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get_latest_version(AgentId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_events_below_version_truncates() {
        let backend = MemoryBackend::new();
        let agent = AgentId::new();
        backend
            .append_events(agent, vec![event(agent, 0), event(agent, 0), event(agent, 0)], 0)
            .await
            .unwrap();

        backend.delete_events_below_version(agent, 3).await.unwrap();
        let remaining = backend.get_events(agent, None, None, None).await.unwrap();
        assert_eq!(remaining.iter().map(|e| e.version).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn snapshots_round_trip() {
        let backend = MemoryBackend::new();
        let agent = AgentId::new();
        assert!(backend.get_latest_snapshot(agent).await.unwrap().is_none());

        let snap = Snapshot {
            agent_id: agent,
            version: 5,
            timestamp: Utc::now(),
            state_data: vec![9, 9, 9],
        };
        backend.save_snapshot(snap.clone()).await.unwrap();

        let loaded = backend.get_latest_snapshot(agent).await.unwrap().unwrap();
        assert_eq!(loaded, snap);
    }

    #[tokio::test]
    async fn live_broadcast_receives_appended_events() {
        let backend = MemoryBackend::new();
        let mut rx = backend.subscribe();
        let agent = AgentId::new();

        backend.append_events(agent, vec![event(agent, 0)], 0).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.agent_id, agent);
        assert_eq!(received.version, 1);
    }
}
