#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-sourcing** – Deterministic event-sourcing core of
//! gagent-runtime.
//!
//! [`EventSourcingCore`] holds one agent's staged (raised) events,
//! current version, and current state, and mediates every append
//! against a [`gagent_store_core::PersistenceBackend`]: `raise_event`
//! stages, `confirm_events` appends under optimistic concurrency and
//! applies a pure [`Transition`], `activate` replays a snapshot plus
//! subsequent events in pages.
//!
//! *Scope*: this crate does not itself own a mailbox, a stream, or
//! subscription routing — those live in `gagent-bus-core` and
//! `gagent-runtime`. It is the pure state-evolution half of the agent
//! lifecycle, usable standalone against any `PersistenceBackend`.

mod core;
mod snapshot;
mod transition;

pub use core::{EventSourcingCore, ReplayStats};
pub use snapshot::{EveryN, Never, SnapshotStrategy};
pub use transition::Transition;
