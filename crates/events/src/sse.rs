//! SSE fan-out listener.
//!
//! Keeps one bounded channel per connected client. The transport layer
//! (out of scope here) registers a client, drains the receiving half into
//! its SSE response, and the listener pushes every event to every client.
//!
//! Delivery is strictly non-blocking: a client whose channel is full or
//! closed is dropped and unregistered on the spot. A slow dashboard must
//! never stall the generation pipeline.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use ax_domain::events::Event;

use crate::dispatcher::EventListener;

/// Default per-client channel capacity.
const DEFAULT_CLIENT_CAPACITY: usize = 128;

#[derive(Default)]
pub struct SseListener {
    clients: RwLock<HashMap<String, mpsc::Sender<Event>>>,
}

impl SseListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client and return the receiving half of its channel.
    /// Re-registering an existing id replaces (and thereby closes) the
    /// previous channel.
    pub fn register_client(&self, client_id: impl Into<String>) -> mpsc::Receiver<Event> {
        self.register_client_with_capacity(client_id, DEFAULT_CLIENT_CAPACITY)
    }

    pub fn register_client_with_capacity(
        &self,
        client_id: impl Into<String>,
        capacity: usize,
    ) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.clients.write().insert(client_id.into(), tx);
        rx
    }

    /// Remove a client explicitly (transport saw the connection close).
    pub fn unregister_client(&self, client_id: &str) -> bool {
        self.clients.write().remove(client_id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl EventListener for SseListener {
    fn name(&self) -> &str {
        "sse"
    }

    fn on_event(&self, event: &Event) {
        // Fast path: push under the read lock, remembering who failed.
        let stale: Vec<String> = {
            let clients = self.clients.read();
            clients
                .iter()
                .filter_map(|(id, tx)| match tx.try_send(event.clone()) {
                    Ok(()) => None,
                    Err(mpsc::error::TrySendError::Full(_))
                    | Err(mpsc::error::TrySendError::Closed(_)) => Some(id.clone()),
                })
                .collect()
        };

        if !stale.is_empty() {
            let mut clients = self.clients.write();
            for id in stale {
                tracing::warn!(client_id = %id, "dropping stalled SSE client");
                clients.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_domain::events::EventPayload;

    fn event(turn: u32) -> Event {
        Event::new(EventPayload::ContextCancelled { turn })
    }

    #[tokio::test]
    async fn delivers_to_registered_client() {
        let listener = SseListener::new();
        let mut rx = listener.register_client("c1");

        listener.on_event(&event(1));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload.kind(), "context_cancelled");
    }

    #[tokio::test]
    async fn full_channel_drops_and_unregisters_client() {
        let listener = SseListener::new();
        // Capacity 1: the second event would block, so the client is dropped.
        let _rx = listener.register_client_with_capacity("slow", 1);

        listener.on_event(&event(1));
        assert_eq!(listener.client_count(), 1);

        listener.on_event(&event(2));
        assert_eq!(listener.client_count(), 0);
    }

    #[tokio::test]
    async fn closed_receiver_unregisters_client() {
        let listener = SseListener::new();
        let rx = listener.register_client("gone");
        drop(rx);

        listener.on_event(&event(1));
        assert_eq!(listener.client_count(), 0);
    }

    #[tokio::test]
    async fn slow_client_does_not_affect_healthy_one() {
        let listener = SseListener::new();
        let _slow = listener.register_client_with_capacity("slow", 1);
        let mut healthy = listener.register_client("healthy");

        listener.on_event(&event(1));
        listener.on_event(&event(2));

        assert!(healthy.recv().await.is_some());
        assert!(healthy.recv().await.is_some());
        assert_eq!(listener.client_count(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let listener = SseListener::new();
        let _rx = listener.register_client("c1");
        assert!(listener.unregister_client("c1"));
        assert!(!listener.unregister_client("c1"));
    }
}
