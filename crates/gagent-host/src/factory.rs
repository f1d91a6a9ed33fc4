//! [`ActorManager`]: creates, activates and deactivates agent actors of
//! one actor type, enforcing `kAlreadyActive` (spec §4.7).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gagent_runtime::{AgentDependencies, GAgentBase, HandlerTable};
use gagent_sourcing::{ReplayStats, Transition};
use gagent_types::{AgentId, RuntimeError, Version};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One running agent: its `GAgentBase` (behind a lock so callers can
/// still reach `publish`/`version` while the mailbox loop runs
/// independently in `driver_task`) plus the task draining its stream.
struct ActiveActor<S, T>
where
    T: Transition<S>,
{
    agent: Arc<Mutex<GAgentBase<S, T>>>,
    driver_task: JoinHandle<()>,
}

/// A slot in the manager's directory. `Reserving` closes the race
/// between the `kAlreadyActive` check and the (async) activation work
/// that follows it — a second `create` call for the same id observes
/// `Reserving` and fails immediately rather than racing the first
/// call's replay.
enum ActorSlot<S, T>
where
    T: Transition<S>,
{
    Reserving,
    Active(ActiveActor<S, T>),
}

/// A handle to one active, managed agent — everything an `ActorManager`
/// caller needs without reaching into the manager's internal directory
/// again.
#[derive(Clone)]
pub struct ActorHandle<S, T>
where
    T: Transition<S>,
{
    agent_id: AgentId,
    agent: Arc<Mutex<GAgentBase<S, T>>>,
}

impl<S, T> ActorHandle<S, T>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    T: Transition<S> + Send + Sync + 'static,
    T::Error: std::fmt::Display,
{
    /// This agent's id.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// Current applied event-sourcing version.
    pub async fn version(&self) -> Version {
        self.agent.lock().await.version().await
    }

    /// Publish an envelope from this agent, routed per `direction`.
    pub async fn publish(
        &self,
        type_url: impl Into<String>,
        payload: Vec<u8>,
        direction: gagent_types::Direction,
        correlation_id: Option<String>,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        self.agent
            .lock()
            .await
            .publish(type_url, payload, direction, correlation_id, metadata)
            .await
    }
}

/// Creates, tracks and tears down every active agent of one actor type
/// in this process (spec §4.7's `ActorFactory`/`ActorManager`).
///
/// `S` is the agent's state shape and `T` its [`Transition`]; both are
/// fixed for the lifetime of one `ActorManager` — host one manager per
/// agent type, all sharing the same [`AgentDependencies`] so agents of
/// different types can still reach each other's streams through the
/// common [`gagent_bus_core::StreamRegistry`].
pub struct ActorManager<S, T>
where
    T: Transition<S>,
{
    deps: AgentDependencies,
    transition: T,
    handlers: HandlerTable<S>,
    active: DashMap<AgentId, ActorSlot<S, T>>,
}

impl<S, T> ActorManager<S, T>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    T: Transition<S> + Clone + Send + Sync + 'static,
    T::Error: std::fmt::Display,
{
    /// Build a manager for one actor type: `transition` is cloned per
    /// created agent, `handlers` is shared (cheaply, via `Arc` per
    /// entry — see [`HandlerTable::clone`]) across every agent this
    /// manager creates.
    pub fn new(deps: AgentDependencies, transition: T, handlers: HandlerTable<S>) -> Self {
        Self { deps, transition, handlers, active: DashMap::new() }
    }

    /// Number of agents currently active in this manager.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether `agent_id` is currently active in this process.
    pub fn is_active(&self, agent_id: AgentId) -> bool {
        matches!(self.active.get(&agent_id).as_deref(), Some(ActorSlot::Active(_)))
    }

    /// **ActorFactory::create** (spec §4.7 steps 1-5): instantiate the
    /// agent, inject dependencies, acquire its stream, replay via
    /// `OnActivate`, and spawn its mailbox loop.
    ///
    /// Fails with [`RuntimeError::AlreadyActive`] if `agent_id` is
    /// already active (or in the process of activating) in this
    /// process.
    pub async fn create(&self, agent_id: AgentId) -> Result<(ActorHandle<S, T>, ReplayStats), RuntimeError> {
        match self.active.entry(agent_id) {
            Entry::Occupied(_) => return Err(RuntimeError::AlreadyActive { agent: agent_id }),
            Entry::Vacant(v) => {
                v.insert(ActorSlot::Reserving);
            }
        }

        let mut agent = GAgentBase::new(agent_id, self.transition.clone(), self.deps.clone());
        let activation = agent.activate(self.handlers.clone()).await;

        let stats = match activation {
            Ok(stats) => stats,
            Err(err) => {
                self.active.remove(&agent_id);
                self.deps.stream_registry.remove(agent_id);
                return Err(err);
            }
        };

        let driver = agent
            .take_driver()
            .expect("freshly created agent always owns its stream driver");
        let driver_task = tokio::spawn(driver.run());

        let agent = Arc::new(Mutex::new(agent));
        self.active.insert(
            agent_id,
            ActorSlot::Active(ActiveActor { agent: agent.clone(), driver_task }),
        );

        info!(agent = %agent_id, events_applied = stats.events_applied, "agent activated");
        Ok((ActorHandle { agent_id, agent }, stats))
    }

    /// Look up an already-active agent's handle, if any.
    pub fn get(&self, agent_id: AgentId) -> Option<ActorHandle<S, T>> {
        match self.active.get(&agent_id).as_deref() {
            Some(ActorSlot::Active(active)) => {
                Some(ActorHandle { agent_id, agent: active.agent.clone() })
            }
            _ => None,
        }
    }

    /// **ActorFactory::deactivate** (spec §4.7, reverse of `create`):
    /// idempotent — deactivating an id with no active agent is a no-op,
    /// matching the spec's reactivation/deactivation idempotency
    /// requirement. Confirms any pending raised events, unsubscribes
    /// every handler (so no further handler for this agent runs once
    /// this call returns — testable property #6), tears down the
    /// stream, and stops the mailbox task.
    pub async fn deactivate(&self, agent_id: AgentId) -> Result<(), RuntimeError> {
        let Some((_, slot)) = self.active.remove(&agent_id) else {
            return Ok(());
        };
        let ActorSlot::Active(active) = slot else {
            return Ok(());
        };

        let result = active.agent.lock().await.deactivate().await;
        self.deps.stream_registry.remove(agent_id);
        active.driver_task.abort();

        if let Err(err) = &result {
            warn!(agent = %agent_id, error = %err, "deactivate: pending events failed to confirm");
        }
        info!(agent = %agent_id, "agent deactivated");
        result
    }
}
