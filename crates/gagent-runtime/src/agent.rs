//! The single-writer execution core for one agent (spec §4.5,
//! `GAgentBase`).
//!
//! A [`GAgentBase`] owns an [`EventSourcingCore`] (durable state), a
//! [`MessageStream`]/[`StreamDriver`] pair (the mailbox), and wires its
//! registered [`HandlerTable`] onto the stream as ordinary subscribers.
//! The stream's own drain loop *is* the agent's single-writer mailbox
//! loop — there is no second dispatch layer underneath it, which is how
//! this crate reconciles §4.1's stream-level dispatch with §4.5's
//! mailbox-level dispatch: they are the same mechanism.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use gagent_bus_core::{EventDeduplicator, MessageStream, StreamDriver, StreamRegistry, SubscriptionId, SubscriptionManager};
use gagent_sourcing::{EventSourcingCore, ReplayStats, Transition};
use gagent_store_core::PersistenceBackend;
use gagent_types::{AgentId, Direction, Envelope, RuntimeConfig, RuntimeError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::handler::HandlerTable;

/// Process-local collaborators every agent needs injected at
/// construction time (spec §4.7 step 2 / §9's "property-injector
/// helpers" re-architecture: a single struct instead of reflection-based
/// setter injection).
#[derive(Clone)]
pub struct AgentDependencies {
    /// Durable event/snapshot storage.
    pub repository: Arc<dyn PersistenceBackend>,
    /// Process-wide stream directory.
    pub stream_registry: Arc<StreamRegistry>,
    /// Process-wide parent/child relationship tracker.
    pub subscriptions: Arc<SubscriptionManager>,
    /// Tunables (snapshot interval, dedup window, mailbox capacity, ...).
    pub config: RuntimeConfig,
}

/// Monitoring counters referenced by §7's "increment counter" /
/// §8 scenario 6's "error count incremented" language.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    /// Handler invocations that returned an error.
    pub handler_failures: AtomicU64,
    /// Envelopes dropped because their id was already in the dedup
    /// window.
    pub duplicates_dropped: AtomicU64,
}

/// The single-writer runtime for one agent.
///
/// Not `Clone`: exactly one `GAgentBase` should exist per active agent
/// id in a process, matching the `ActorFactory`'s `kAlreadyActive`
/// guard in `gagent-host`.
pub struct GAgentBase<S, T>
where
    T: Transition<S>,
{
    agent_id: AgentId,
    core: Arc<Mutex<EventSourcingCore<S, T>>>,
    dedup: Arc<Mutex<EventDeduplicator>>,
    stream: MessageStream,
    driver: Option<StreamDriver>,
    stream_registry: Arc<StreamRegistry>,
    subscriptions: Arc<SubscriptionManager>,
    config: RuntimeConfig,
    metrics: Arc<AgentMetrics>,
    subscription_ids: Vec<SubscriptionId>,
    /// Set once a `TransitionState` application poisons this agent (spec
    /// §7: fatal — the event is already durable but could not be
    /// applied, so in-memory state is inconsistent with the log). Once
    /// set, every handler dispatch for this agent short-circuits instead
    /// of running, and the registered handler unsubscribes itself from
    /// the stream — the agent stops accepting further envelopes without
    /// requiring the caller to notice and call [`Self::deactivate`]
    /// first, though callers should still do so to confirm/teardown
    /// cleanly and to investigate per the spec's "manual intervention"
    /// policy.
    poisoned: Arc<AtomicBool>,
}

impl<S, T> GAgentBase<S, T>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    T: Transition<S> + Send + Sync + 'static,
    T::Error: std::fmt::Display,
{
    /// Construct a new, not-yet-activated agent. Acquires (or creates)
    /// this agent's stream via the registry — spec §4.7 step 3.
    pub fn new(agent_id: AgentId, transition: T, deps: AgentDependencies) -> Self {
        let (stream, driver) = deps.stream_registry.get_or_create(agent_id, deps.config.mailbox_capacity);
        let snapshot_strategy = Box::new(gagent_sourcing::EveryN::new(deps.config.snapshot_interval));
        let core = EventSourcingCore::new(agent_id, deps.repository, transition, snapshot_strategy);
        let dedup = EventDeduplicator::new(deps.config.dedup_max_entries, deps.config.dedup_ttl);

        Self {
            agent_id,
            core: Arc::new(Mutex::new(core)),
            dedup: Arc::new(Mutex::new(dedup)),
            stream,
            driver,
            stream_registry: deps.stream_registry,
            subscriptions: deps.subscriptions,
            config: deps.config,
            metrics: Arc::new(AgentMetrics::default()),
            subscription_ids: Vec::new(),
            poisoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// This agent's id.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// `true` once a handler dispatch has hit [`RuntimeError::TransitionPoisoned`]
    /// for this agent (spec §7: fatal). The agent's handlers have already
    /// unsubscribed themselves; the caller should still call
    /// [`Self::deactivate`] to tear down cleanly and then investigate.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Monitoring counters for this agent.
    pub fn metrics(&self) -> Arc<AgentMetrics> {
        self.metrics.clone()
    }

    /// Current applied event-sourcing version.
    pub async fn version(&self) -> gagent_types::Version {
        self.core.lock().await.version()
    }

    /// **OnActivate** (spec §4.5 / §4.7 step 4): loads the latest
    /// snapshot and replays subsequent events, then registers every
    /// handler in `handlers` as a stream subscriber. The stream's own
    /// drain loop becomes the mailbox loop once [`Self::take_driver`]
    /// is spawned by the caller.
    pub async fn activate(&mut self, handlers: HandlerTable<S>) -> Result<ReplayStats, RuntimeError> {
        let stats = {
            let mut core = self.core.lock().await;
            core.activate(self.config.max_replay_batch, self.config.allow_unknown_on_replay).await?
        };

        let handlers = Arc::new(handlers);
        for type_url in handlers.registered_type_urls() {
            let core = self.core.clone();
            let dedup = self.dedup.clone();
            let metrics = self.metrics.clone();
            let handlers = handlers.clone();
            let auto_confirm = self.config.auto_confirm_events;
            let agent_id = self.agent_id;
            let stream_registry = self.stream_registry.clone();
            let subscriptions = self.subscriptions.clone();
            let type_url_owned = type_url.clone();
            let poisoned = self.poisoned.clone();
            let own_stream = self.stream.clone();
            // Filled in just below once `subscribe` hands back this
            // closure's own id, so the closure can unsubscribe itself on
            // `TransitionPoisoned` without the caller having to notice.
            let own_id_cell: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
            let own_id_cell_for_closure = own_id_cell.clone();

            let id = self
                .stream
                .subscribe(
                    format!("gagent-runtime::{agent_id}"),
                    type_url,
                    Arc::new(move |envelope: Envelope| {
                        let core = core.clone();
                        let dedup = dedup.clone();
                        let metrics = metrics.clone();
                        let handlers = handlers.clone();
                        let stream_registry = stream_registry.clone();
                        let subscriptions = subscriptions.clone();
                        let type_url_owned = type_url_owned.clone();
                        let poisoned = poisoned.clone();
                        let own_stream = own_stream.clone();
                        let own_id_cell = own_id_cell_for_closure.clone();

                        Box::pin(async move {
                            if poisoned.load(Ordering::SeqCst) {
                                return Ok(());
                            }

                            {
                                let mut dedup = dedup.lock().await;
                                if !dedup.try_mark_seen(envelope.id) {
                                    metrics.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
                                    return Ok(());
                                }
                            }

                            let snapshot_state = core.lock().await.state().clone();
                            for registered in handlers.handlers_for(&type_url_owned) {
                                match registered.handler().handle(&snapshot_state, &envelope).await {
                                    Ok(raised) => {
                                        if !raised.is_empty() {
                                            let mut core = core.lock().await;
                                            for event in raised {
                                                core.raise_event(event.type_url, event.payload, event.metadata);
                                            }
                                            if auto_confirm {
                                                match core.confirm_events().await {
                                                    Ok(_) => {}
                                                    Err(err @ RuntimeError::TransitionPoisoned { .. }) => {
                                                        poisoned.store(true, Ordering::SeqCst);
                                                        tracing::error!(
                                                            agent = %agent_id,
                                                            handler = registered.name(),
                                                            envelope_id = %envelope.id,
                                                            error = %err,
                                                            "transition poisoned; agent stopping, manual intervention required"
                                                        );
                                                        if let Some(id) = *own_id_cell.lock().await {
                                                            own_stream.unsubscribe(id).await;
                                                        }
                                                        return Err(err);
                                                    }
                                                    Err(err) => return Err(err),
                                                }
                                            }
                                        }
                                    }
                                    Err(err) => {
                                        metrics.handler_failures.fetch_add(1, Ordering::Relaxed);
                                        warn!(
                                            agent = %agent_id,
                                            handler = registered.name(),
                                            envelope_id = %envelope.id,
                                            error = %err,
                                            "handler failed; isolated, mailbox continues"
                                        );
                                    }
                                }
                            }

                            if envelope.direction != Direction::Own {
                                forward_one_hop(agent_id, &envelope, &subscriptions, &stream_registry);
                            }

                            Ok(())
                        })
                    }),
                )
                .await;
            *own_id_cell.lock().await = Some(id);
            self.subscription_ids.push(id);
        }

        Ok(stats)
    }

    /// Take the consumer-side stream driver so the caller can spawn its
    /// `run()` loop. Returns `None` once already taken, or if this
    /// process was not the one that first created the stream (another
    /// task already owns the driver).
    pub fn take_driver(&mut self) -> Option<StreamDriver> {
        self.driver.take()
    }

    /// Publish an envelope of `type_url` from this agent, routed per
    /// `direction` via the one-hop [`SubscriptionManager::targets`]
    /// resolution.
    pub async fn publish(
        &self,
        type_url: impl Into<String>,
        payload: Vec<u8>,
        direction: Direction,
        correlation_id: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<(), RuntimeError> {
        let envelope = Envelope::raised(self.agent_id, type_url, payload, direction, correlation_id, metadata);
        deliver(self.agent_id, &envelope, &self.subscriptions, &self.stream_registry)
    }

    /// **Deactivate** (spec §4.7, reverse of activation): confirms any
    /// still-pending raised events, then unsubscribes every handler this
    /// agent registered. Idempotent — calling it twice is a no-op the
    /// second time since there is nothing left to tear down.
    pub async fn deactivate(&mut self) -> Result<(), RuntimeError> {
        {
            let mut core = self.core.lock().await;
            core.confirm_events().await?;
        }
        for id in self.subscription_ids.drain(..) {
            self.stream.unsubscribe(id).await;
        }
        Ok(())
    }
}

/// Fire-and-forget re-propagation to the next hop after local dispatch.
/// There is no publisher waiting on this path's result, so a dead target
/// here is only logged, never bubbled — the caller that actually
/// published the envelope already got its `Result` from [`deliver`].
fn forward_one_hop(
    agent_id: AgentId,
    envelope: &Envelope,
    subscriptions: &SubscriptionManager,
    stream_registry: &StreamRegistry,
) {
    for target in subscriptions.targets(agent_id, envelope.direction) {
        if target == agent_id {
            continue;
        }
        let _ = forward_to(target, envelope, stream_registry);
    }
}

/// Route a freshly published envelope to every one-hop target, surfacing
/// a dead-letter or backpressure failure back to the publisher (spec §7:
/// `kNotFound` when the target has no active stream). Returns the first
/// failure encountered; still attempts delivery to every target rather
/// than stopping at the first one.
fn deliver(
    publisher: AgentId,
    envelope: &Envelope,
    subscriptions: &SubscriptionManager,
    stream_registry: &StreamRegistry,
) -> Result<(), RuntimeError> {
    let mut first_err = None;
    for target in subscriptions.targets(publisher, envelope.direction) {
        if let Err(err) = forward_to(target, envelope, stream_registry) {
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn forward_to(target: AgentId, envelope: &Envelope, stream_registry: &StreamRegistry) -> Result<(), RuntimeError> {
    let Some(stream) = stream_registry.get(target) else {
        warn!(agent = %target, envelope_id = %envelope.id, "dead letter: target agent has no active stream");
        return Err(RuntimeError::NotFound { what: format!("agent {target} has no active stream") });
    };
    if let Err(err) = stream.publish(envelope.clone()) {
        warn!(agent = %target, envelope_id = %envelope.id, error = %err, "forward failed");
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RaisedEvent;
    use gagent_store_memory::MemoryBackend;
    use gagent_types::StateEventRecord;
    use serde::Deserialize;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct CounterState {
        counter: i64,
    }

    fn apply_delta(state: &CounterState, event: &StateEventRecord) -> Result<CounterState, String> {
        let delta: i64 = rmp_serde::from_slice(&event.event_data).map_err(|e| e.to_string())?;
        Ok(CounterState { counter: state.counter + delta })
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Bump {
        delta: i64,
    }

    fn deps() -> AgentDependencies {
        AgentDependencies {
            repository: Arc::new(MemoryBackend::new()),
            stream_registry: Arc::new(StreamRegistry::new()),
            subscriptions: Arc::new(SubscriptionManager::new()),
            config: RuntimeConfig::default(),
        }
    }

    #[tokio::test]
    async fn activation_registers_handler_and_processes_envelope() {
        let agent_id = AgentId::new();
        let deps = deps();
        let mut agent = GAgentBase::new(
            agent_id,
            apply_delta as fn(&CounterState, &StateEventRecord) -> Result<CounterState, String>,
            deps.clone(),
        );

        let mut handlers: HandlerTable<CounterState> = HandlerTable::new();
        handlers.register::<Bump, _, _>("bump", "gagent.test.Bump", |_state, payload, _env| async move {
            Ok(vec![RaisedEvent::new(
                "counter.delta",
                rmp_serde::to_vec(&payload.delta).unwrap(),
            )])
        });

        agent.activate(handlers).await.unwrap();
        let driver = agent.take_driver().unwrap();
        tokio::spawn(driver.run());

        let (stream, _) = deps.stream_registry.get_or_create(agent_id, None);
        stream
            .publish(Envelope::raised(
                AgentId::new(),
                "gagent.test.Bump",
                rmp_serde::to_vec(&Bump { delta: 5 }).unwrap(),
                Direction::Own,
                None,
                HashMap::new(),
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(agent.version().await, 1);
    }

    #[tokio::test]
    async fn handler_failure_isolated_does_not_stop_sibling() {
        let agent_id = AgentId::new();
        let deps = deps();
        let mut agent = GAgentBase::new(
            agent_id,
            apply_delta as fn(&CounterState, &StateEventRecord) -> Result<CounterState, String>,
            deps.clone(),
        );

        let ok_hits = Arc::new(AtomicU32::new(0));
        let ok_hits2 = ok_hits.clone();

        let mut handlers: HandlerTable<CounterState> = HandlerTable::new();
        handlers.register::<Bump, _, _>("failing", "gagent.test.Bump", |_state, _payload, _env| async move {
            Err(RuntimeError::InvalidArgument { reason: "boom".to_string() })
        });
        handlers.register::<Bump, _, _>("ok", "gagent.test.Bump", move |_state, _payload, _env| {
            let ok_hits2 = ok_hits2.clone();
            async move {
                ok_hits2.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }
        });

        agent.activate(handlers).await.unwrap();
        let metrics = agent.metrics();
        let driver = agent.take_driver().unwrap();
        tokio::spawn(driver.run());

        let (stream, _) = deps.stream_registry.get_or_create(agent_id, None);
        stream
            .publish(Envelope::raised(
                AgentId::new(),
                "gagent.test.Bump",
                rmp_serde::to_vec(&Bump { delta: 1 }).unwrap(),
                Direction::Own,
                None,
                HashMap::new(),
            ))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.handler_failures.load(Ordering::Relaxed), 1);
        assert_eq!(agent.version().await, 0);
    }
}
