//! Event fan-out for the Axon agent core.
//!
//! The [`EventDispatcher`] delivers typed lifecycle events to an ordered
//! list of listeners. Listener failures never affect the caller or other
//! listeners. The SSE listener variant manages per-client bounded
//! channels for a transport layer that lives outside this crate.

pub mod collect;
pub mod dispatcher;
pub mod sse;

pub use collect::CollectingListener;
pub use dispatcher::{EventDispatcher, EventListener, TracingListener};
pub use sse::SseListener;
