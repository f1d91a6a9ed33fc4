//! Storage-layer error type.
//!
//! Kept distinct from [`gagent_types::RuntimeError`] because a backend's
//! failure modes (serialization, I/O, concurrency) are a narrower,
//! backend-facing vocabulary; `gagent-sourcing` translates
//! [`StoreError::ConcurrencyConflict`] into
//! `RuntimeError::ConcurrencyConflict` at the event-sourcing boundary
//! where the agent id and expected/actual versions are back in scope.

use gagent_types::{AgentId, Version};

/// Errors a persistence backend can report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The stored tip version did not match the caller's
    /// `expected_version`.
    #[error("concurrency conflict on agent {agent}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Agent whose log was being appended to.
        agent: AgentId,
        /// Version the caller expected.
        expected: Version,
        /// Version actually stored.
        actual: Version,
    },

    /// The backend could not serialize or deserialize a payload.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// An underlying I/O or transport failure occurred talking to the
    /// backend. Pending events remain staged on the caller's side; the
    /// caller should retry with the same `expected_version`.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The requested agent, event, or snapshot does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}
