//! Parent/child relationship bookkeeping and one-hop routing resolution.
//!
//! Propagation across a hierarchy deeper than one hop is **not** done by
//! a single traversal here. [`SubscriptionManager::targets`] only ever
//! resolves the *immediate* neighbours for a publisher and direction;
//! each recipient decides, on its own, whether to re-publish onward to
//! its own next hop (see `gagent-runtime`'s re-propagation logic). This
//! keeps every hop at most one mailbox deep and relies on
//! [`crate::EventDeduplicator`] at each agent to stop `Both`-direction
//! cycles between parent and child.

use std::collections::HashSet;

use dashmap::DashMap;
use gagent_types::{AgentId, Direction};

/// One agent's relationship record: its parent (if any) and its ordered
/// set of direct children.
#[derive(Debug, Clone, Default)]
pub struct Relationship {
    /// Parent agent id, or `None` if this agent is a root (or has been
    /// orphaned transiently during reparenting).
    pub parent: Option<AgentId>,
    /// Direct children, in the order they were added.
    pub children: Vec<AgentId>,
}

/// Tracks hierarchy relationships and resolves one-hop routing targets
/// for a published envelope's direction.
///
/// Held only in the local process; relationships are re-established on
/// activation from whatever durable source an application chooses to
/// keep them in (out of scope for this crate — the runtime only needs
/// the in-memory view to route).
#[derive(Default)]
pub struct SubscriptionManager {
    relationships: DashMap<AgentId, Relationship>,
}

impl SubscriptionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` as a direct child of `parent`. Idempotent: adding
    /// the same child twice is a no-op.
    ///
    /// `AddChild` and `SetParent` are intentionally separate operations;
    /// a caller that only calls one leaves the relationship one-sided
    /// (accepted, per spec, as a transient state that converges once the
    /// pairing call arrives).
    pub fn add_child(&self, parent: AgentId, child: AgentId) {
        let mut entry = self.relationships.entry(parent).or_default();
        if !entry.children.contains(&child) {
            entry.children.push(child);
        }
    }

    /// Remove `child` from `parent`'s child set. Idempotent.
    pub fn remove_child(&self, parent: AgentId, child: AgentId) {
        if let Some(mut entry) = self.relationships.get_mut(&parent) {
            entry.children.retain(|c| *c != child);
        }
    }

    /// Set `child`'s parent to `parent`, replacing any previous parent.
    /// Idempotent.
    pub fn set_parent(&self, child: AgentId, parent: AgentId) {
        let mut entry = self.relationships.entry(child).or_default();
        entry.parent = Some(parent);
    }

    /// Clear `child`'s parent, if any. Idempotent.
    pub fn clear_parent(&self, child: AgentId) {
        if let Some(mut entry) = self.relationships.get_mut(&child) {
            entry.parent = None;
        }
    }

    /// Fully attach `child` under `parent`: pairs [`Self::add_child`] and
    /// [`Self::set_parent`] in one call, which is the common case callers
    /// want (the two halves remain independently callable for the
    /// transient one-sided states the spec allows).
    pub fn attach(&self, parent: AgentId, child: AgentId) {
        self.add_child(parent, child);
        self.set_parent(child, parent);
    }

    /// Fully detach `child` from `parent`: pairs [`Self::remove_child`]
    /// and [`Self::clear_parent`].
    pub fn detach(&self, parent: AgentId, child: AgentId) {
        self.remove_child(parent, child);
        self.clear_parent(child);
    }

    /// Current relationship record for `agent_id`, if one has been
    /// established.
    pub fn relationship(&self, agent_id: AgentId) -> Option<Relationship> {
        self.relationships.get(&agent_id).map(|r| r.clone())
    }

    /// Resolve the immediate (one-hop) set of agent ids a published
    /// envelope from `publisher` with `direction` must reach, per the
    /// Direction -> Targets table in spec §4.3.
    ///
    /// The returned set always includes `publisher` itself (every
    /// direction's target set starts there) plus, depending on
    /// direction, the direct parent and/or direct children.
    pub fn targets(&self, publisher: AgentId, direction: Direction) -> Vec<AgentId> {
        let rel = self.relationships.get(&publisher);
        let mut out: HashSet<AgentId> = HashSet::new();
        out.insert(publisher);

        match direction {
            Direction::Own => {}
            Direction::Up => {
                if let Some(parent) = rel.as_ref().and_then(|r| r.parent) {
                    out.insert(parent);
                }
            }
            Direction::Down => {
                if let Some(rel) = rel.as_ref() {
                    out.extend(rel.children.iter().copied());
                }
            }
            Direction::Both => {
                if let Some(rel) = rel.as_ref() {
                    if let Some(parent) = rel.parent {
                        out.insert(parent);
                    }
                    out.extend(rel.children.iter().copied());
                }
            }
        }
        out.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_establishes_both_halves() {
        let mgr = SubscriptionManager::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        mgr.attach(parent, child);

        assert_eq!(mgr.relationship(child).unwrap().parent, Some(parent));
        assert!(mgr.relationship(parent).unwrap().children.contains(&child));
    }

    #[test]
    fn down_targets_are_publisher_plus_direct_children() {
        let mgr = SubscriptionManager::new();
        let parent = AgentId::new();
        let c1 = AgentId::new();
        let c2 = AgentId::new();
        mgr.attach(parent, c1);
        mgr.attach(parent, c2);

        let mut targets = mgr.targets(parent, Direction::Down);
        targets.sort_by_key(|id| id.to_string());
        let mut expected = vec![parent, c1, c2];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(targets, expected);
    }

    #[test]
    fn up_targets_are_publisher_plus_parent_only() {
        let mgr = SubscriptionManager::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        mgr.attach(parent, child);

        let targets = mgr.targets(child, Direction::Up);
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&child));
        assert!(targets.contains(&parent));
    }

    #[test]
    fn both_targets_are_publisher_parent_and_children() {
        let mgr = SubscriptionManager::new();
        let grandparent = AgentId::new();
        let middle = AgentId::new();
        let leaf = AgentId::new();
        mgr.attach(grandparent, middle);
        mgr.attach(middle, leaf);

        let targets = mgr.targets(middle, Direction::Both);
        assert_eq!(targets.len(), 3);
        assert!(targets.contains(&middle));
        assert!(targets.contains(&grandparent));
        assert!(targets.contains(&leaf));
    }

    #[test]
    fn detach_removes_both_halves() {
        let mgr = SubscriptionManager::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        mgr.attach(parent, child);
        mgr.detach(parent, child);

        assert_eq!(mgr.relationship(child).unwrap().parent, None);
        assert!(!mgr.relationship(parent).unwrap().children.contains(&child));
    }

    #[test]
    fn reparenting_moves_child_to_new_parent() {
        let mgr = SubscriptionManager::new();
        let old_parent = AgentId::new();
        let new_parent = AgentId::new();
        let child = AgentId::new();

        mgr.attach(old_parent, child);
        mgr.detach(old_parent, child);
        mgr.attach(new_parent, child);

        assert!(!mgr.relationship(old_parent).unwrap().children.contains(&child));
        assert!(mgr.relationship(new_parent).unwrap().children.contains(&child));
        assert_eq!(mgr.relationship(child).unwrap().parent, Some(new_parent));
    }
}
