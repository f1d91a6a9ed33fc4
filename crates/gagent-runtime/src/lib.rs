#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **gagent-runtime** – Single-writer agent lifecycle and mailbox runtime.
//!
//! This crate hosts [`GAgentBase`], the per-agent execution unit that
//! owns exactly one [`gagent_sourcing::EventSourcingCore`] and exactly
//! one [`gagent_bus_core::MessageStream`]/[`gagent_bus_core::StreamDriver`]
//! pair. Registering a [`HandlerTable`] and activating the agent wires
//! each declared `type_url` onto the stream as an ordinary subscriber,
//! so the stream's own sequential drain loop *is* the agent's
//! single-writer mailbox loop described by the state-evolution half of
//! this engine in `gagent-sourcing`.
//!
//! Handlers never mutate state directly — they decode an inbound
//! envelope's payload, inspect a snapshot of current state, and return
//! [`RaisedEvent`]s the runtime stages via `raise_event`/`confirm_events`
//! on their behalf. A handler failure is isolated: it is logged and
//! counted on [`AgentMetrics`], and never stops sibling handlers or the
//! mailbox loop.

mod agent;
mod handler;

pub use agent::{AgentDependencies, AgentMetrics, GAgentBase};
pub use handler::{Handler, HandlerTable, RaisedEvent};
