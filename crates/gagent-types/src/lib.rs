#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-types** – Shared primitive data structures for the gagent-runtime
//! agent engine.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing
//! cycles. It defines the wire-level agent identity, event envelope,
//! persisted-event record, snapshot, runtime configuration and error
//! taxonomy shared across the engine. It makes no assumptions about
//! transport, storage backend, or scheduling.

use serde::{Deserialize, Serialize};

/// Maximum allowed size for a `type_url` string, defensive against
/// pathological inputs on the wire.
pub const MAX_TYPE_URL_LEN: usize = 512;

/// Maximum allowed size for a metadata value, mirrors [`MAX_TYPE_URL_LEN`]'s
/// purpose for the envelope metadata map.
pub const MAX_METADATA_VALUE_LEN: usize = 4096;

pub mod config;
pub mod envelope;
pub mod error;
pub mod records;
pub mod registry;

pub use config::RuntimeConfig;
pub use envelope::{Direction, Envelope};
pub use error::RuntimeError;
pub use records::{Snapshot, StateEventRecord};
pub use registry::{TypeDescriptor, TypeRegistry};

//─────────────────────────────
//  Core identifiers
//─────────────────────────────

/// Unique, 128-bit identifier for an agent, stable across process restarts.
///
/// Agents, like everything else addressable in the engine, are identified
/// opaquely; the id carries no semantic meaning beyond equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub uuid::Uuid);

impl AgentId {
    /// Generate a new random agent id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Construct an agent id from an existing UUID (e.g. loaded from
    /// storage or supplied by a caller).
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic, 1-based index of an event within its originating agent's log.
/// `0` means "no events".
pub type Version = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_roundtrips_through_json() {
        let id = AgentId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn agent_id_display_matches_uuid() {
        let uuid = uuid::Uuid::nil();
        let id = AgentId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }
}
