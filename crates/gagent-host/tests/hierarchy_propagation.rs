//! Multi-agent hierarchy scenarios that a single `ActorManager` cannot
//! exercise on its own: one-hop re-propagation across three or more
//! levels, dedup across redundant paths, and reparenting isolation.

use std::sync::Arc;
use std::time::Duration;

use gagent_bus_core::{StreamRegistry, SubscriptionManager};
use gagent_host::ActorManager;
use gagent_runtime::{AgentDependencies, HandlerTable, RaisedEvent};
use gagent_store_memory::MemoryBackend;
use gagent_types::{AgentId, Direction, Envelope, RuntimeConfig, StateEventRecord};
use serde::{Deserialize, Serialize};

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

const BUMP_TYPE: &str = "gagent.host.test.Bump";

fn manager(
    deps: AgentDependencies,
) -> ActorManager<CounterState, fn(&CounterState, &StateEventRecord) -> Result<CounterState, String>> {
    let mut handlers: HandlerTable<CounterState> = HandlerTable::new();
    handlers.register::<Bump, _, _>("bump", BUMP_TYPE, |_state, payload, _env| async move {
        Ok(vec![RaisedEvent::new("counter.delta", rmp_serde::to_vec(&payload.delta).unwrap())])
    });
    ActorManager::new(deps, apply_delta as _, handlers)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(75)).await;
}

/// Scenario 4 (spec §8): chain P ← M ← L, L publishes `Both`. Each of P,
/// M, L must end up having delivered the envelope to its handler exactly
/// once, and a second publication of the identical envelope id must be
/// dropped everywhere.
#[tokio::test]
async fn bidirectional_propagation_delivers_once_and_dedups_replays() {
    let deps = AgentDependencies {
        repository: Arc::new(MemoryBackend::new()),
        stream_registry: Arc::new(StreamRegistry::new()),
        subscriptions: Arc::new(SubscriptionManager::new()),
        config: RuntimeConfig::default(),
    };
    let mgr = manager(deps.clone());

    let p_id = AgentId::new();
    let m_id = AgentId::new();
    let l_id = AgentId::new();
    let (p, _) = mgr.create(p_id).await.unwrap();
    let (m, _) = mgr.create(m_id).await.unwrap();
    let (l, _) = mgr.create(l_id).await.unwrap();
    deps.subscriptions.attach(p_id, m_id);
    deps.subscriptions.attach(m_id, l_id);

    let envelope = Envelope::raised(
        l_id,
        BUMP_TYPE,
        rmp_serde::to_vec(&Bump { delta: 1 }).unwrap(),
        Direction::Both,
        None,
        Default::default(),
    );
    let (l_stream, _) = deps.stream_registry.get_or_create(l_id, None);
    l_stream.publish(envelope.clone()).unwrap();
    settle().await;

    assert_eq!(p.version().await, 1, "ancestor must receive the Both-directed event exactly once");
    assert_eq!(m.version().await, 1, "intermediate node must receive it exactly once");
    assert_eq!(l.version().await, 1, "originator must apply its own event exactly once");

    // Republishing the identical id must be dropped at every hop.
    l_stream.publish(envelope).unwrap();
    settle().await;

    assert_eq!(p.version().await, 1);
    assert_eq!(m.version().await, 1);
    assert_eq!(l.version().await, 1);
}

/// Scenario 5 (spec §8): `E` starts under `oldM`, is reparented to
/// `newM`. `oldM`'s subsequent `Down` publications must no longer reach
/// `E`; `newM`'s publications must.
#[tokio::test]
async fn reparenting_isolates_old_parent_and_attaches_new_one() {
    let deps = AgentDependencies {
        repository: Arc::new(MemoryBackend::new()),
        stream_registry: Arc::new(StreamRegistry::new()),
        subscriptions: Arc::new(SubscriptionManager::new()),
        config: RuntimeConfig::default(),
    };
    let mgr = manager(deps.clone());

    let old_m_id = AgentId::new();
    let new_m_id = AgentId::new();
    let e_id = AgentId::new();
    let (old_m, _) = mgr.create(old_m_id).await.unwrap();
    let (new_m, _) = mgr.create(new_m_id).await.unwrap();
    let (e, _) = mgr.create(e_id).await.unwrap();
    deps.subscriptions.attach(old_m_id, e_id);

    deps.subscriptions.detach(old_m_id, e_id);
    deps.subscriptions.attach(new_m_id, e_id);

    old_m
        .publish(BUMP_TYPE, rmp_serde::to_vec(&Bump { delta: 1 }).unwrap(), Direction::Down, None, Default::default())
        .await
        .unwrap();
    settle().await;
    assert_eq!(e.version().await, 0, "E must not receive oldM's Down update after reparenting");
    assert_eq!(old_m.version().await, 1);

    new_m
        .publish(BUMP_TYPE, rmp_serde::to_vec(&Bump { delta: 1 }).unwrap(), Direction::Down, None, Default::default())
        .await
        .unwrap();
    settle().await;
    assert_eq!(e.version().await, 1, "E must receive newM's Down update");
    assert_eq!(new_m.version().await, 1);
}
