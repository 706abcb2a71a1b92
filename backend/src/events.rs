//! SSE fan-out for orchestration events.
//!
//! Components publish [`MinaretEvent`]s into a broadcast channel; each
//! dashboard connection gets its own receiver. The latest
//! broadcast-lifecycle event is retained and replayed to new
//! subscribers so a client connecting mid-broadcast sees its state
//! immediately instead of waiting for the next transition.

use axum::response::sse::{Event, KeepAlive};
use axum::response::Sse;
use futures::Stream;
use minaret_types::MinaretEvent;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

struct BroadcasterInner {
    sender: broadcast::Sender<MinaretEvent>,
    last_broadcast: Mutex<Option<MinaretEvent>>,
}

/// Fan-out hub handed to every component that emits events.
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl EventBroadcaster {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        EventBroadcaster {
            inner: Arc::new(BroadcasterInner {
                sender,
                last_broadcast: Mutex::new(None),
            }),
        }
    }

    /// Publish an event to all connected clients.
    ///
    /// Never fails: with no subscribers the event is simply dropped,
    /// apart from broadcast-lifecycle events which are retained for
    /// replay.
    pub fn broadcast(&self, event: MinaretEvent) {
        debug!("event: {}", event.description());
        if event.is_broadcast_lifecycle() {
            *self.inner.last_broadcast.lock() = Some(event.clone());
        }
        let _ = self.inner.sender.send(event);
    }

    /// Open an SSE stream: the retained lifecycle event first (if any),
    /// then live events as they happen.
    pub fn subscribe(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let rx = self.inner.sender.subscribe();

        let replay: Vec<Result<Event, Infallible>> = self
            .inner
            .last_broadcast
            .lock()
            .iter()
            .filter_map(to_sse)
            .map(Ok)
            .collect();

        let live = BroadcastStream::new(rx).filter_map(|result| match result {
            Ok(event) => to_sse(&event).map(Ok),
            Err(e) => {
                // BroadcastStream yields RecvError when the client lags.
                warn!("client lagging, skipping events: {}", e);
                None
            }
        });

        Sse::new(tokio_stream::iter(replay).chain(live)).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }

    /// The retained broadcast-lifecycle event, if any was published.
    pub fn last_broadcast_event(&self) -> Option<MinaretEvent> {
        self.inner.last_broadcast.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        EventBroadcaster::new(100)
    }
}

/// Serialize an event as a named SSE event with a JSON payload.
fn to_sse(event: &MinaretEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.kind()).data(json)),
        Err(e) => {
            tracing::error!("failed to serialize event: {}", e);
            None
        }
    }
}
