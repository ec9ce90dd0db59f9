//! Streaming chunk relay.
//!
//! Active only on the first attempt against the primary model. The relay
//! owns a bounded chunk channel; the provider pushes [`StreamChunk`]s into
//! the sending half while a dedicated worker drains the receiving half,
//! emitting one lifecycle event per chunk and invoking the user callback
//! for content fragments. When the channel closes the worker signals
//! completion, after which the coordinator emits `StreamingEnd` — so all
//! per-chunk events for a generation precede its end event.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use ax_domain::events::EventPayload;
use ax_domain::{ChunkSender, StreamChunk};
use ax_events::EventDispatcher;

use crate::traits::ContentCallback;

/// Bounded capacity of the chunk channel.
pub const STREAM_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamStats {
    pub total_chunks: usize,
}

pub struct StreamRelay {
    tx: ChunkSender,
    done: oneshot::Receiver<StreamStats>,
    started: Instant,
}

impl StreamRelay {
    /// Allocate the channel and start the consumer worker.
    pub fn spawn(
        turn: u32,
        dispatcher: Arc<EventDispatcher>,
        on_content: Option<ContentCallback>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<StreamChunk>(STREAM_CHANNEL_CAPACITY);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut total_chunks = 0usize;
            // Running index over *content* chunks only; tool-call events
            // do not advance it.
            let mut content_index = 0u32;

            while let Some(chunk) = rx.recv().await {
                total_chunks += 1;
                match chunk {
                    StreamChunk::Content { text, .. } => {
                        dispatcher.emit(EventPayload::StreamingChunk {
                            content: text.clone(),
                            index: content_index,
                        });
                        content_index += 1;
                        if let Some(cb) = &on_content {
                            cb(&text);
                        }
                    }
                    StreamChunk::ToolCallStart {
                        call_id,
                        name,
                        arguments,
                    } => {
                        dispatcher.emit(EventPayload::ToolCallStart {
                            turn,
                            call_id,
                            name,
                            arguments,
                        });
                    }
                    StreamChunk::ToolCallEnd {
                        call_id,
                        name,
                        result,
                        duration_ms,
                    } => {
                        dispatcher.emit(EventPayload::ToolCallEnd {
                            turn,
                            call_id,
                            name,
                            result,
                            duration_ms,
                        });
                    }
                }
            }

            let _ = done_tx.send(StreamStats { total_chunks });
        });

        Self {
            tx,
            done: done_rx,
            started: Instant::now(),
        }
    }

    /// The sending half to inject into the provider call.
    pub fn sender(&self) -> ChunkSender {
        self.tx.clone()
    }

    /// Drop the relay's sender and wait for the worker to drain the
    /// channel. The caller must have dropped its own sender clones first
    /// (or the channel never closes).
    pub async fn finish(self) -> (StreamStats, Duration) {
        let Self { tx, done, started } = self;
        drop(tx);
        let stats = done.await.unwrap_or_default();
        (stats, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ax_events::CollectingListener;
    use parking_lot::Mutex;

    fn setup() -> (Arc<EventDispatcher>, Arc<CollectingListener>) {
        let dispatcher = Arc::new(EventDispatcher::new());
        let collector = Arc::new(CollectingListener::new());
        dispatcher.register(collector.clone());
        (dispatcher, collector)
    }

    #[tokio::test]
    async fn content_chunks_emit_events_and_invoke_callback() {
        let (dispatcher, collector) = setup();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let callback: ContentCallback = Arc::new(move |text| seen_cb.lock().push(text.to_owned()));

        let relay = StreamRelay::spawn(1, dispatcher, Some(callback));
        let tx = relay.sender();
        tx.send(StreamChunk::Content { text: "hel".into(), index: 0 }).await.unwrap();
        tx.send(StreamChunk::Content { text: "lo".into(), index: 0 }).await.unwrap();
        drop(tx);

        let (stats, _elapsed) = relay.finish().await;
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(seen.lock().join(""), "hello");

        let chunks = collector.payloads_of_kind("streaming_chunk");
        assert_eq!(chunks.len(), 2);
        // The relay assigns its own running content index.
        match &chunks[1] {
            EventPayload::StreamingChunk { index, .. } => assert_eq!(*index, 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_call_chunks_do_not_advance_content_index() {
        let (dispatcher, collector) = setup();
        let relay = StreamRelay::spawn(2, dispatcher, None);
        let tx = relay.sender();
        tx.send(StreamChunk::Content { text: "a".into(), index: 0 }).await.unwrap();
        tx.send(StreamChunk::ToolCallStart {
            call_id: "c1".into(),
            name: "exec".into(),
            arguments: "{}".into(),
        })
        .await
        .unwrap();
        tx.send(StreamChunk::Content { text: "b".into(), index: 0 }).await.unwrap();
        drop(tx);

        let (stats, _) = relay.finish().await;
        assert_eq!(stats.total_chunks, 3);

        let chunks = collector.payloads_of_kind("streaming_chunk");
        match &chunks[1] {
            EventPayload::StreamingChunk { index, .. } => assert_eq!(*index, 1),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(collector.payloads_of_kind("tool_call_start").len(), 1);
    }

    #[tokio::test]
    async fn finish_without_chunks_reports_zero() {
        let (dispatcher, _collector) = setup();
        let relay = StreamRelay::spawn(1, dispatcher, None);
        let (stats, _) = relay.finish().await;
        assert_eq!(stats.total_chunks, 0);
    }

    #[tokio::test]
    async fn tool_call_end_event_carries_duration() {
        let (dispatcher, collector) = setup();
        let relay = StreamRelay::spawn(1, dispatcher, None);
        let tx = relay.sender();
        tx.send(StreamChunk::ToolCallEnd {
            call_id: "c1".into(),
            name: "exec".into(),
            result: "done".into(),
            duration_ms: 12,
        })
        .await
        .unwrap();
        drop(tx);
        relay.finish().await;

        let ends = collector.payloads_of_kind("tool_call_end");
        match &ends[0] {
            EventPayload::ToolCallEnd { duration_ms, .. } => assert_eq!(*duration_ms, 12),
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
