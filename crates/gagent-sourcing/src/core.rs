//! Deterministic state evolution: raise, confirm, replay, snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use gagent_store_core::{PersistenceBackend, StoreError};
use gagent_types::registry::TypeRegistry;
use gagent_types::{AgentId, RuntimeError, Snapshot, StateEventRecord, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::snapshot::SnapshotStrategy;
use crate::transition::Transition;

/// Outcome of replaying an agent's log on activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of events applied.
    pub events_applied: u64,
    /// Number of events skipped because their `event_type` was unknown
    /// and `allow_unknown_on_replay` permitted skipping.
    pub events_skipped: u64,
    /// Whether a snapshot was loaded as the replay starting point.
    pub loaded_from_snapshot: bool,
}

/// Per-agent event-sourcing engine: owns the staged (raised-but-
/// unconfirmed) events, the current state, and the version counter, and
/// mediates every write against a [`PersistenceBackend`].
///
/// One instance is created per active agent; it is not `Clone` because
/// it is the single writer for that agent's state (spec §4.5 — no
/// per-agent locking is needed precisely because nothing else holds a
/// second handle to this core).
pub struct EventSourcingCore<S, T>
where
    T: Transition<S>,
{
    agent_id: AgentId,
    repository: Arc<dyn PersistenceBackend>,
    transition: T,
    snapshot_strategy: Box<dyn SnapshotStrategy>,
    current_version: Version,
    state: S,
    pending: Vec<StateEventRecord>,
}

impl<S, T> EventSourcingCore<S, T>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync,
    T: Transition<S>,
{
    /// Construct a fresh core at version 0 with default state. Callers
    /// that need to resume an already-active agent should call
    /// [`Self::activate`] immediately after.
    pub fn new(
        agent_id: AgentId,
        repository: Arc<dyn PersistenceBackend>,
        transition: T,
        snapshot_strategy: Box<dyn SnapshotStrategy>,
    ) -> Self {
        Self {
            agent_id,
            repository,
            transition,
            snapshot_strategy,
            current_version: 0,
            state: S::default(),
            pending: Vec::new(),
        }
    }

    /// Current applied version.
    pub fn version(&self) -> Version {
        self.current_version
    }

    /// Reference to the current, fully-applied state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Number of events raised but not yet confirmed.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// **RaiseEvent** (spec §4.5, step 1-3): assigns a tentative version,
    /// appends to the pending list, and does *not* mutate state. Returns
    /// the new event's id.
    ///
    /// Also registers `event_type` in the process-wide [`TypeRegistry`]:
    /// whoever raises an event inherently knows how to decode it (the
    /// `Transition` that will later apply it is already in scope), so
    /// this is the one place the engine can populate the registry
    /// without asking every caller to do it by hand. Registration is
    /// additive and idempotent, matching the registry's "global static
    /// cache" design (spec §9) — it is what lets a later `activate()`
    /// replay recognize `event_type`s this same process has raised
    /// before, rather than skipping them as unknown.
    pub fn raise_event(
        &mut self,
        event_type: impl Into<String>,
        payload: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Uuid {
        let event_type = event_type.into();
        TypeRegistry::register(gagent_types::registry::TypeDescriptor {
            type_url: event_type.clone(),
            display_name: event_type.clone(),
        });

        let tentative_version = self.current_version + self.pending.len() as Version + 1;
        let event_id = Uuid::new_v4();
        self.pending.push(StateEventRecord {
            event_id,
            agent_id: self.agent_id,
            version: tentative_version,
            timestamp: Utc::now(),
            event_type,
            event_data: payload,
            metadata,
        });
        event_id
    }

    /// **ConfirmEvents** (spec §4.5, steps 1-6). No-op if nothing is
    /// pending. On success returns the new tip version; on a
    /// concurrency conflict the pending list is cleared (abort, no
    /// auto-retry, per §7) and the conflict is surfaced to the caller.
    pub async fn confirm_events(&mut self) -> Result<Option<Version>, RuntimeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let pending = std::mem::take(&mut self.pending);
        let expected = self.current_version;

        let new_version = match self
            .repository
            .append_events(self.agent_id, pending.clone(), expected)
            .await
        {
            Ok(v) => v,
            Err(StoreError::ConcurrencyConflict { agent, expected, actual }) => {
                return Err(RuntimeError::ConcurrencyConflict { agent, expected, actual });
            }
            Err(other) => {
                // Surface, but leave the events re-stageable: the caller
                // retries with the same expected_version.
                self.pending = pending;
                return Err(RuntimeError::RepositoryUnavailable {
                    agent: self.agent_id,
                    reason: other.to_string(),
                });
            }
        };

        for event in &pending {
            let applied = self.transition.apply(&self.state, event).map_err(|e| {
                RuntimeError::TransitionPoisoned {
                    agent: self.agent_id,
                    version: event.version,
                    reason: e.to_string(),
                }
            })?;
            self.state = applied;
        }
        self.current_version = new_version;

        if self.snapshot_strategy.should_snapshot(expected, self.current_version) {
            self.write_snapshot().await?;
        }

        Ok(Some(new_version))
    }

    /// Force a snapshot write at the current version regardless of the
    /// configured strategy.
    pub async fn write_snapshot(&self) -> Result<(), RuntimeError> {
        let state_data = rmp_serde::to_vec_named(&self.state).map_err(|e| {
            RuntimeError::InvalidArgument { reason: format!("snapshot encode failed: {e}") }
        })?;
        let snapshot = Snapshot {
            agent_id: self.agent_id,
            version: self.current_version,
            timestamp: Utc::now(),
            state_data,
        };
        self.repository.save_snapshot(snapshot).await.map_err(|e| {
            RuntimeError::RepositoryUnavailable { agent: self.agent_id, reason: e.to_string() }
        })
    }

    /// **Activation replay** (spec §4.5 `OnActivate`, §4.6 paged
    /// replay). Loads the latest snapshot (if any), then replays
    /// subsequent events in pages of at most `max_replay_batch`,
    /// applying each via `Transition`. Unknown `event_type`s are
    /// skipped with a warning if `allow_unknown_on_replay` is true,
    /// otherwise replay aborts.
    pub async fn activate(
        &mut self,
        max_replay_batch: usize,
        allow_unknown_on_replay: bool,
    ) -> Result<ReplayStats, RuntimeError> {
        let snapshot = self.repository.get_latest_snapshot(self.agent_id).await.map_err(|e| {
            RuntimeError::RepositoryUnavailable { agent: self.agent_id, reason: e.to_string() }
        })?;

        let loaded_from_snapshot = snapshot.is_some();
        if let Some(snapshot) = snapshot {
            self.state = rmp_serde::from_slice(&snapshot.state_data).map_err(|e| {
                RuntimeError::InvalidArgument { reason: format!("snapshot decode failed: {e}") }
            })?;
            self.current_version = snapshot.version;
        } else {
            self.state = S::default();
            self.current_version = 0;
        }

        let mut events_applied = 0u64;
        let mut events_skipped = 0u64;

        loop {
            let page = self
                .repository
                .get_events(
                    self.agent_id,
                    Some(self.current_version + 1),
                    None,
                    Some(max_replay_batch),
                )
                .await
                .map_err(|e| RuntimeError::RepositoryUnavailable {
                    agent: self.agent_id,
                    reason: e.to_string(),
                })?;

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            for event in &page {
                if !TypeRegistry::is_known(&event.event_type) {
                    if allow_unknown_on_replay {
                        tracing::warn!(
                            agent = %self.agent_id,
                            event_type = %event.event_type,
                            "skipping unknown event type during replay"
                        );
                        events_skipped += 1;
                        self.current_version = event.version;
                        continue;
                    } else {
                        return Err(RuntimeError::TypeUnknown { type_url: event.event_type.clone() });
                    }
                }

                self.state = self.transition.apply(&self.state, event).map_err(|e| {
                    RuntimeError::TransitionPoisoned {
                        agent: self.agent_id,
                        version: event.version,
                        reason: e.to_string(),
                    }
                })?;
                self.current_version = event.version;
                events_applied += 1;
            }

            if page_len < max_replay_batch {
                break;
            }
        }

        Ok(ReplayStats { events_applied, events_skipped, loaded_from_snapshot })
    }
}
