//! Basic agent example.
//!
//! Demonstrates the usual host wiring: one `ActorManager` for a simple
//! counter agent type, a parent/child pair attached via
//! `SubscriptionManager`, and a `Down`-propagated event reaching the
//! child's handler.

use std::sync::Arc;

use anyhow::Result;
use gagent_bus_core::{StreamRegistry, SubscriptionManager};
use gagent_host::ActorManager;
use gagent_runtime::{AgentDependencies, HandlerTable, RaisedEvent};
use gagent_store_memory::MemoryBackend;
use gagent_types::{AgentId, Direction, RuntimeConfig, StateEventRecord};
use serde::{Deserialize, Serialize};
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

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let deps = AgentDependencies {
        repository: Arc::new(MemoryBackend::new()),
        stream_registry: Arc::new(StreamRegistry::new()),
        subscriptions: Arc::new(SubscriptionManager::new()),
        config: RuntimeConfig::default(),
    };

    let mut handlers: HandlerTable<CounterState> = HandlerTable::new();
    handlers.register::<Bump, _, _>("bump", "example.Bump", |_state, payload, _env| async move {
        Ok(vec![RaisedEvent::new("counter.delta", rmp_serde::to_vec(&payload.delta).unwrap())])
    });

    let manager = ActorManager::new(
        deps.clone(),
        apply_delta as fn(&CounterState, &StateEventRecord) -> Result<CounterState, String>,
        handlers,
    );

    let parent_id = AgentId::new();
    let child_id = AgentId::new();
    let (parent, _) = manager.create(parent_id).await?;
    let (child, _) = manager.create(child_id).await?;
    deps.subscriptions.attach(parent_id, child_id);

    parent
        .publish(
            "example.Bump",
            rmp_serde::to_vec(&Bump { delta: 5 })?,
            Direction::Down,
            None,
            Default::default(),
        )
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("parent version: {}", parent.version().await);
    println!("child version (received via Down propagation): {}", child.version().await);

    manager.deactivate(child_id).await?;
    manager.deactivate(parent_id).await?;
    Ok(())
}
