//! The pure state-transition contract.

use gagent_types::StateEventRecord;

/// Maps `(prior-state, event)` to a new state. Must be pure: no I/O, no
/// time source other than the event's own timestamp, no randomness.
///
/// [`EventSourcingCore`](crate::EventSourcingCore) clones the current
/// state before calling this so a failed transition leaves the live
/// state untouched; the failure itself is still fatal to the agent
/// (the event is already durable) per the spec's error taxonomy.
pub trait Transition<S>: Send + Sync {
    /// The error type returned on an invalid transition. Carried as a
    /// string into `RuntimeError::TransitionPoisoned` by the caller.
    type Error: std::fmt::Display;

    /// Apply `event` to `state`, returning the new state.
    fn apply(&self, state: &S, event: &StateEventRecord) -> Result<S, Self::Error>;
}

impl<S, E, F> Transition<S> for F
where
    F: Fn(&S, &StateEventRecord) -> Result<S, E> + Send + Sync,
    E: std::fmt::Display,
{
    type Error = E;

    fn apply(&self, state: &S, event: &StateEventRecord) -> Result<S, Self::Error> {
        self(state, event)
    }
}
