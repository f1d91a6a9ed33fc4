//! The error taxonomy shared by every crate in the workspace.
//!
//! One variant per row of the error-handling design table: each variant is
//! a stable, matchable error code a caller can branch on, not merely a
//! human-readable message.

use crate::{AgentId, Version};

/// Errors surfaced to callers of the agent-runtime engine.
///
/// Variant names are a design choice of this implementation; the spec
/// only requires the *codes* to be distinguishable (`kConcurrencyConflict`
/// etc.), which is what `#[error(...)]` plus `std::mem::discriminant`
/// equality gives callers here.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// `AppendEvents` found a stored tip version different from
    /// `expected_version`.
    #[error("concurrency conflict on agent {agent}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Agent whose log was being appended to.
        agent: AgentId,
        /// Version the caller expected.
        expected: Version,
        /// Version actually found in the repository.
        actual: Version,
    },

    /// A bounded stream's queue was full at publish time.
    #[error("backpressure: stream for agent {agent} is at capacity")]
    Backpressure {
        /// Agent whose stream rejected the publish.
        agent: AgentId,
    },

    /// `ActorFactory::create` was called for an id that is already active
    /// in this process.
    #[error("agent {agent} is already active")]
    AlreadyActive {
        /// Agent id that was already active.
        agent: AgentId,
    },

    /// An operation was attempted against an agent that has not been
    /// activated (or has since been deactivated) in this process.
    #[error("agent {agent} is not active")]
    NotActive {
        /// Agent id that was not active.
        agent: AgentId,
    },

    /// A `type_url` could not be resolved to a known payload schema.
    #[error("unknown type_url: {type_url}")]
    TypeUnknown {
        /// The unresolved type url.
        type_url: String,
    },

    /// User handler code returned an error while processing an envelope.
    #[error("handler {handler} failed for agent {agent}: {reason}")]
    HandlerFailed {
        /// Agent the handler belongs to.
        agent: AgentId,
        /// Registered handler name.
        handler: String,
        /// Failure detail.
        reason: String,
    },

    /// The operation was cancelled via a caller-supplied cancellation
    /// signal.
    #[error("operation cancelled for agent {agent}")]
    Cancelled {
        /// Agent the cancelled operation targeted.
        agent: AgentId,
    },

    /// A caller-supplied deadline elapsed before the operation completed.
    #[error("operation timed out for agent {agent}")]
    Timeout {
        /// Agent the timed-out operation targeted.
        agent: AgentId,
    },

    /// A caller supplied a structurally invalid argument.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of what was invalid.
        reason: String,
    },

    /// The target of an operation (agent, event, snapshot) does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of what could not be found.
        what: String,
    },

    /// The persistence backend could not be reached or returned an I/O
    /// failure while appending events.
    ///
    /// Pending events remain staged on the caller's side; retry with the
    /// same `expected_version` once the backend recovers.
    #[error("repository unavailable for agent {agent}: {reason}")]
    RepositoryUnavailable {
        /// Agent whose append was in flight.
        agent: AgentId,
        /// Failure detail.
        reason: String,
    },

    /// `TransitionState` raised an error while applying a persisted event.
    ///
    /// This is fatal to the agent per the spec's error-handling design:
    /// the event is already durable, so the in-memory state is now
    /// inconsistent with it. The agent must be deactivated and requires
    /// manual intervention; it is not auto-retried.
    #[error("transition poisoned for agent {agent} at version {version}: {reason}")]
    TransitionPoisoned {
        /// Agent whose state transition failed.
        agent: AgentId,
        /// Version of the event whose application failed.
        version: Version,
        /// Failure detail.
        reason: String,
    },
}
