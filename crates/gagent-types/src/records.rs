//! Persisted event and snapshot records — the shapes that cross the
//! storage boundary, as opposed to [`crate::Envelope`] which crosses the
//! stream/transport boundary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AgentId, Version};

/// An event as stored by a persistence backend (see the
/// `gagent-store-core` crate's `EventRepository` trait). Immutable once
/// appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEventRecord {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Agent that owns this event log.
    pub agent_id: AgentId,
    /// Monotonic version assigned at append time.
    pub version: Version,
    /// Wall-clock UTC timestamp.
    pub timestamp: DateTime<Utc>,
    /// Resolves the payload schema.
    pub event_type: String,
    /// Packed payload bytes.
    pub event_data: Vec<u8>,
    /// Free-form string metadata carried over from the envelope.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A cumulative, versioned snapshot of an agent's state.
///
/// Snapshots supersede all events strictly older than their `version` for
/// replay purposes; `version <= latest event.version` must hold at all
/// times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Agent this snapshot belongs to.
    pub agent_id: AgentId,
    /// Version this snapshot reflects.
    pub version: Version,
    /// Wall-clock UTC timestamp when the snapshot was written.
    pub timestamp: DateTime<Utc>,
    /// Packed, schema-defined serialized state.
    pub state_data: Vec<u8>,
}
