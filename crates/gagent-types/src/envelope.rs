//! The event envelope: the transport wrapper carrying identity, timing,
//! direction and routing metadata for every message that crosses an agent
//! boundary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AgentId, Version};

/// Propagation intent of an envelope relative to the publisher's position
/// in the agent hierarchy.
///
/// `Self` is included explicitly per the spec's resolution of an open
/// question: some routing code in comparable systems implies it, some
/// omits it, so this engine always carries it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Deliver only to the publisher's own stream.
    #[serde(rename = "self")]
    Own,
    /// Deliver to the publisher and, recursively, its ancestor chain.
    Up,
    /// Deliver to the publisher and, recursively, its descendant set.
    Down,
    /// Union of `Up` and `Down` from the publisher.
    Both,
}

/// A typed message carrying identity, timing, direction and routing
/// metadata, as it travels between agent streams.
///
/// `version` is `0` while the envelope is in transit before being
/// appended to the publisher's event log; the repository assigns the real
/// value at append time (see `gagent-store-core::EventRepository`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope/event identifier.
    pub id: Uuid,
    /// Wall-clock UTC timestamp assigned at creation.
    pub timestamp: DateTime<Utc>,
    /// Monotonic version within the publisher's log; `0` before append.
    pub version: Version,
    /// Resolves the payload schema, e.g. `type.googleapis.com/orders.Placed`.
    pub type_url: String,
    /// Opaque, schema-defined packed payload bytes.
    pub payload: Vec<u8>,
    /// Agent that published this envelope.
    pub publisher_id: AgentId,
    /// Optional correlation id linking this envelope to a causal chain.
    pub correlation_id: Option<String>,
    /// Propagation intent.
    pub direction: Direction,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Envelope {
    /// Build an envelope for a locally-raised (not yet appended) event.
    ///
    /// `version` is left at `0`; the repository fills it in during
    /// `AppendEvents`.
    pub fn raised(
        publisher_id: AgentId,
        type_url: impl Into<String>,
        payload: Vec<u8>,
        direction: Direction,
        correlation_id: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version: 0,
            type_url: type_url.into(),
            payload,
            publisher_id,
            correlation_id,
            direction,
            metadata,
        }
    }

    /// Derive a follow-up envelope inheriting this envelope's
    /// `correlation_id` unless the caller supplies its own.
    ///
    /// This is the concrete rule this engine applies where the spec is
    /// silent on correlation propagation: a handler that raises an event
    /// while processing an inbound envelope keeps the causal thread
    /// unless it explicitly overrides it.
    pub fn inherited_correlation(&self, override_id: Option<String>) -> Option<String> {
        override_id.or_else(|| self.correlation_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_envelope_has_zero_version() {
        let env = Envelope::raised(
            AgentId::new(),
            "type.googleapis.com/test.Event",
            vec![1, 2, 3],
            Direction::Up,
            None,
            HashMap::new(),
        );
        assert_eq!(env.version, 0);
    }

    #[test]
    fn correlation_inherits_when_not_overridden() {
        let parent = Envelope::raised(
            AgentId::new(),
            "type.googleapis.com/test.Event",
            vec![],
            Direction::Both,
            Some("corr-1".to_string()),
            HashMap::new(),
        );
        assert_eq!(parent.inherited_correlation(None), Some("corr-1".to_string()));
        assert_eq!(
            parent.inherited_correlation(Some("corr-2".to_string())),
            Some("corr-2".to_string())
        );
    }

    #[test]
    fn direction_serializes_self_as_lowercase() {
        let json = serde_json::to_string(&Direction::Own).unwrap();
        assert_eq!(json, "\"self\"");
    }
}
