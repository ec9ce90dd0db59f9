//! In-memory collecting listener.
//!
//! Buffers every event it sees. Used by test suites to assert on event
//! sequences and by diagnostics surfaces that want a recent-events view.

use parking_lot::Mutex;

use ax_domain::events::{Event, EventPayload};

use crate::dispatcher::EventListener;

#[derive(Default)]
pub struct CollectingListener {
    events: Mutex<Vec<Event>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything collected so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Payloads only, for sequence assertions.
    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events.lock().iter().map(|e| e.payload.clone()).collect()
    }

    /// Payloads whose serde tag equals `kind`.
    pub fn payloads_of_kind(&self, kind: &str) -> Vec<EventPayload> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.payload.kind() == kind)
            .map(|e| e.payload.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventListener for CollectingListener {
    fn name(&self) -> &str {
        "collecting"
    }

    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
