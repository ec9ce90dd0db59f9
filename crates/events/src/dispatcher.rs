//! Synchronous best-effort event dispatch.
//!
//! Listeners are registered once at startup and invoked in registration
//! order for every event. A listener that panics or misbehaves is logged
//! and skipped; dispatch never fails the caller. Listeners must be safe
//! for concurrent dispatch — the dispatcher holds only a read lock across
//! delivery, so emits from concurrent requests overlap.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use ax_domain::events::{Event, EventPayload};

/// A consumer of lifecycle events.
pub trait EventListener: Send + Sync {
    /// Short name used in logs when the listener misbehaves.
    fn name(&self) -> &str;

    fn on_event(&self, event: &Event);
}

/// Ordered fan-out of events to registered listeners.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener. Order of registration is delivery order.
    pub fn register(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Wrap `payload` in a fresh envelope and deliver it.
    pub fn emit(&self, payload: EventPayload) {
        self.emit_event(&Event::new(payload));
    }

    /// Deliver an already-enveloped event to every listener.
    pub fn emit_event(&self, event: &Event) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if result.is_err() {
                tracing::error!(
                    listener = listener.name(),
                    event = event.payload.kind(),
                    "event listener panicked"
                );
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tracing listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Logs every event as a single structured JSON line.
#[derive(Default)]
pub struct TracingListener;

impl EventListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&self, event: &Event) {
        let json = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(event = %json, "ax_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::CollectingListener;
    use ax_domain::events::EventPayload;

    struct PanickingListener;

    impl EventListener for PanickingListener {
        fn name(&self) -> &str {
            "panicking"
        }
        fn on_event(&self, _event: &Event) {
            panic!("listener bug");
        }
    }

    fn cancelled(turn: u32) -> EventPayload {
        EventPayload::ContextCancelled { turn }
    }

    #[test]
    fn delivers_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(CollectingListener::new());
        let second = Arc::new(CollectingListener::new());
        dispatcher.register(first.clone());
        dispatcher.register(second.clone());

        dispatcher.emit(cancelled(1));
        dispatcher.emit(cancelled(2));

        assert_eq!(first.events().len(), 2);
        assert_eq!(second.events().len(), 2);
    }

    #[test]
    fn panicking_listener_does_not_affect_others() {
        let dispatcher = EventDispatcher::new();
        let collector = Arc::new(CollectingListener::new());
        dispatcher.register(Arc::new(PanickingListener));
        dispatcher.register(collector.clone());

        dispatcher.emit(cancelled(1));

        // The panic was contained; the second listener still got the event.
        assert_eq!(collector.events().len(), 1);
    }

    #[test]
    fn emit_with_no_listeners_is_a_noop() {
        let dispatcher = EventDispatcher::new();
        dispatcher.emit(cancelled(1));
        assert_eq!(dispatcher.listener_count(), 0);
    }
}
