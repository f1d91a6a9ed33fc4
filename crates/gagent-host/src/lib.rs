#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-host** – `ActorFactory`/`ActorManager` for gagent-runtime
//! (spec §4.7).
//!
//! `gagent-runtime::GAgentBase` is the single-writer execution unit for
//! *one* agent; this crate is the process-level authority that creates,
//! activates and deactivates those units, enforcing the `kAlreadyActive`
//! fault and giving callers one place to look up a running agent by id.
//!
//! One [`ActorManager`] hosts every active agent of a single actor
//! *type* — fixed state shape `S` and [`gagent_sourcing::Transition`]
//! implementation `T` — the way a virtual-actor runtime hosts one
//! "grain type" per manager (spec §9: "keep the runtime interface
//! language-neutral (`ActorFactory`, `Actor`, `Stream`) and provide one
//! in-process implementation"). Multiple `ActorManager`s, one per agent
//! type, typically share the same [`gagent_runtime::AgentDependencies`]
//! (stream registry, subscription manager, repository) so agents of
//! different types can still address each other through the shared
//! [`gagent_bus_core::StreamRegistry`].

mod factory;

pub use factory::{ActorHandle, ActorManager};
