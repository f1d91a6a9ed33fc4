//! Handler registration without reflection (spec §9's re-architecture of
//! "dynamic reflection for handler discovery").
//!
//! Handlers are registered explicitly, at actor-type construction time,
//! via [`HandlerTable::register`], keyed by `type_url`. No macro or
//! reflection-based discovery is used.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use gagent_types::{Envelope, RuntimeError};
use serde::de::DeserializeOwned;

/// An event a handler wants raised for durable persistence after it
/// returns. The runtime calls `EventSourcingCore::raise_event` for each
/// of these, in order, once the handler completes.
#[derive(Debug, Clone)]
pub struct RaisedEvent {
    /// Resolves the payload schema for the raised event.
    pub type_url: String,
    /// Packed payload bytes.
    pub payload: Vec<u8>,
    /// Free-form metadata to attach to the raised event.
    pub metadata: HashMap<String, String>,
}

impl RaisedEvent {
    /// Build a `RaisedEvent` with no metadata.
    pub fn new(type_url: impl Into<String>, payload: Vec<u8>) -> Self {
        Self { type_url: type_url.into(), payload, metadata: HashMap::new() }
    }
}

/// A type-erased handler reacting to one envelope.
///
/// Handlers receive a snapshot of the agent's current state (cloned
/// before the call, matching the same clone-before-apply discipline
/// `EventSourcingCore` uses for `TransitionState`) and the envelope
/// that triggered them, and return the events they want raised. They
/// must not, and cannot, mutate state directly — that only happens via
/// `TransitionState` inside `ConfirmEvents`.
#[async_trait]
pub trait Handler<S>: Send + Sync {
    /// React to `envelope` given a read-only snapshot of `state`.
    async fn handle(&self, state: &S, envelope: &Envelope) -> Result<Vec<RaisedEvent>, RuntimeError>;
}

struct FnHandler<S, P, F> {
    f: F,
    _marker: PhantomData<fn(S, P)>,
}

#[async_trait]
impl<S, P, F, Fut> Handler<S> for FnHandler<S, P, F>
where
    S: Clone + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    F: Fn(Arc<S>, P, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<RaisedEvent>, RuntimeError>> + Send + 'static,
{
    async fn handle(&self, state: &S, envelope: &Envelope) -> Result<Vec<RaisedEvent>, RuntimeError> {
        let payload: P = rmp_serde::from_slice(&envelope.payload).map_err(|e| {
            RuntimeError::InvalidArgument { reason: format!("payload decode failed: {e}") }
        })?;
        (self.f)(Arc::new(state.clone()), payload, envelope.clone()).await
    }
}

/// One registered handler: its declared name (for error messages and
/// logs) plus the type-erased handler itself.
pub(crate) struct RegisteredHandler<S> {
    name: String,
    handler: Arc<dyn Handler<S>>,
}

impl<S> Clone for RegisteredHandler<S> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), handler: self.handler.clone() }
    }
}

/// The dispatch table built at actor construction time: `type_url ->
/// ordered list of handlers`. Multiple handlers may register for the
/// same `type_url`; all run, in registration order, for each matching
/// envelope (spec §8 scenario 6: one throwing handler never prevents
/// its siblings from running).
pub struct HandlerTable<S> {
    by_type: HashMap<String, Vec<RegisteredHandler<S>>>,
}

impl<S> Default for HandlerTable<S> {
    fn default() -> Self {
        Self { by_type: HashMap::new() }
    }
}

impl<S> Clone for HandlerTable<S> {
    /// Cheap: every handler is reference-counted, so cloning a table to
    /// hand the same handler set to multiple agents of the same actor
    /// type (see `gagent-host::ActorManager`) costs one `Arc` bump per
    /// registered handler, not a deep copy.
    fn clone(&self) -> Self {
        Self { by_type: self.by_type.clone() }
    }
}

impl<S> HandlerTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Create an empty dispatch table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for payload type `P` under `type_url`.
    ///
    /// `f` receives an owned snapshot of the current state, the decoded
    /// payload, and the triggering envelope, and returns the events it
    /// wants raised.
    pub fn register<P, F, Fut>(&mut self, name: impl Into<String>, type_url: impl Into<String>, f: F)
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(Arc<S>, P, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<RaisedEvent>, RuntimeError>> + Send + 'static,
    {
        let handler = Arc::new(FnHandler { f, _marker: PhantomData });
        self.by_type.entry(type_url.into()).or_default().push(RegisteredHandler {
            name: name.into(),
            handler,
        });
    }

    /// Register an already-built [`Handler`] trait object, for handlers
    /// that need manual control over decoding or want to implement
    /// [`Handler`] directly instead of via a closure.
    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        type_url: impl Into<String>,
        handler: Arc<dyn Handler<S>>,
    ) {
        self.by_type.entry(type_url.into()).or_default().push(RegisteredHandler {
            name: name.into(),
            handler,
        });
    }

    /// Handlers registered for `type_url`, in registration order.
    pub(crate) fn handlers_for(&self, type_url: &str) -> &[RegisteredHandler<S>] {
        self.by_type.get(type_url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All distinct `type_url`s this table has at least one handler for.
    pub fn registered_type_urls(&self) -> Vec<String> {
        self.by_type.keys().cloned().collect()
    }
}

impl<S> RegisteredHandler<S> {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Handler<S>> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gagent_types::{AgentId, Direction};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default)]
    struct State {
        seen: u32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn registered_closure_handler_decodes_and_runs() {
        let mut table: HandlerTable<State> = HandlerTable::new();
        table.register::<Ping, _, _>("ping-handler", "type.googleapis.com/test.Ping", |_state, payload, _env| async move {
            Ok(vec![RaisedEvent::new("test.Ponged", rmp_serde::to_vec(&payload.n).unwrap())])
        });

        let envelope = Envelope::raised(
            AgentId::new(),
            "type.googleapis.com/test.Ping",
            rmp_serde::to_vec(&Ping { n: 7 }).unwrap(),
            Direction::Own,
            None,
            HashMap::new(),
        );

        let handlers = table.handlers_for("type.googleapis.com/test.Ping");
        assert_eq!(handlers.len(), 1);
        let state = State::default();
        let raised = handlers[0].handler().handle(&state, &envelope).await.unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].type_url, "test.Ponged");
    }

    #[tokio::test]
    async fn unregistered_type_url_has_no_handlers() {
        let table: HandlerTable<State> = HandlerTable::new();
        assert!(table.handlers_for("type.googleapis.com/test.Unknown").is_empty());
    }
}
