//! Process-wide directory mapping agent id to stream.
//!
//! Agents never hold raw references to peer agents or their streams;
//! every lookup goes through this registry, which is the single point
//! through which actors acquire each other's mailboxes. Locking is
//! fine-grained per id (via [`dashmap`]) so unrelated agents never
//! contend with one another.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gagent_types::AgentId;

use crate::stream::{MessageStream, StreamDriver};

/// Process-wide `agent id -> stream` directory.
///
/// At most one [`MessageStream`] exists per agent id per process; this
/// type is the sole authority enforcing that invariant.
#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<AgentId, MessageStream>,
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing stream for `agent_id`, or create one with the
    /// given mailbox `capacity` if none exists yet. Idempotent: a second
    /// call for the same id returns the stream created by the first,
    /// ignoring `capacity`.
    ///
    /// Returns the publish-side handle always; the consumer-side
    /// [`StreamDriver`] is returned only the first time a stream is
    /// created for this id, since at most one task may ever drain a
    /// given stream. The entry-API match below makes creation atomic
    /// with respect to concurrent callers racing on the same id.
    pub fn get_or_create(
        &self,
        agent_id: AgentId,
        capacity: Option<usize>,
    ) -> (MessageStream, Option<StreamDriver>) {
        match self.streams.entry(agent_id) {
            Entry::Occupied(e) => (e.get().clone(), None),
            Entry::Vacant(e) => {
                let (stream, driver) = MessageStream::new(agent_id, capacity);
                e.insert(stream.clone());
                (stream, Some(driver))
            }
        }
    }

    /// Whether a stream has been created for `agent_id` in this process.
    pub fn exists(&self, agent_id: AgentId) -> bool {
        self.streams.contains_key(&agent_id)
    }

    /// Return the existing stream for `agent_id`, if any, without
    /// creating one. Unlike `exists` followed by `get_or_create`, this is
    /// a single atomic lookup — a caller that only wants to deliver to an
    /// already-active agent (never spin one up as a side effect) should
    /// use this instead, to avoid a check-then-act race against a
    /// concurrent `remove`.
    pub fn get(&self, agent_id: AgentId) -> Option<MessageStream> {
        self.streams.get(&agent_id).map(|entry| entry.clone())
    }

    /// Remove the stream for `agent_id`, if any, returning it. Dropping
    /// the returned stream's last sender closes its mailbox, which in
    /// turn ends the associated [`StreamDriver::run`] loop.
    pub fn remove(&self, agent_id: AgentId) -> Option<MessageStream> {
        self.streams.remove(&agent_id).map(|(_, stream)| stream)
    }

    /// Number of streams currently registered.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no streams are currently registered.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let registry = StreamRegistry::new();
        let id = AgentId::new();

        let (first, driver1) = registry.get_or_create(id, None);
        let (second, driver2) = registry.get_or_create(id, None);

        assert_eq!(first.agent_id(), second.agent_id());
        assert!(driver1.is_some());
        assert!(driver2.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_drops_stream_from_registry() {
        let registry = StreamRegistry::new();
        let id = AgentId::new();
        registry.get_or_create(id, None);
        assert!(registry.exists(id));

        registry.remove(id);
        assert!(!registry.exists(id));
    }

    #[test]
    fn exists_is_false_for_unknown_agent() {
        let registry = StreamRegistry::new();
        assert!(!registry.exists(AgentId::new()));
    }
}
