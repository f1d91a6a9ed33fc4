#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-bus-core** – The hierarchical event-stream layer of
//! gagent-runtime.
//!
//! This crate provides the process-local plumbing that routes envelopes
//! between agents: a typed, multi-subscriber [`MessageStream`] per agent,
//! a [`StreamRegistry`] mapping agent id to stream, a
//! [`SubscriptionManager`] that tracks parent/child relationships and
//! resolves one-hop routing targets for a given [`Direction`], and an
//! [`EventDeduplicator`] that makes repeated or looping deliveries safe to
//! ignore.
//!
//! Everything here is in-memory and process-local; persistence is the
//! concern of `gagent-store-core` and its drivers.

use gagent_types::Direction;

pub mod dedup;
pub mod registry;
pub mod stream;
pub mod subscription;

pub use dedup::EventDeduplicator;
pub use registry::StreamRegistry;
pub use stream::{HandlerFn, MessageStream, StreamDriver, Subscription, SubscriptionId};
pub use subscription::{Relationship, SubscriptionManager};

/// Re-exported for convenience so downstream crates don't need a direct
/// `gagent-types` dependency just to name a [`Direction`].
pub type RoutingDirection = Direction;
