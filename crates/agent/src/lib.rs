//! The Axon agent: a turn-driven loop over the generation pipeline, the
//! context reducers, and the large-output handler.
//!
//! The agent owns no user-facing I/O. It consumes a provider registry, a
//! tool registry, a model catalog, and an event dispatcher; everything it
//! does is observable through lifecycle events.

pub mod agent;
pub mod session;
pub mod spec_cache;

pub use agent::Agent;
pub use session::Session;
pub use spec_cache::SpecCache;
