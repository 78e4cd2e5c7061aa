use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::dto::sse::ServerEvent;

/// Broadcast hub feeding the operator event stream at `/sse/events`.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Hub buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Serialize `payload` and fan it out as `event`. Nothing is built when nobody listens.
    pub fn publish<T: Serialize>(&self, event: &str, payload: &T) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        match ServerEvent::json(event.to_string(), payload) {
            Ok(event) => {
                let _ = self.sender.send(event);
            }
            Err(err) => warn!(event, error = %err, "failed to serialize operator event"),
        }
    }

    /// Number of connected operator streams.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
