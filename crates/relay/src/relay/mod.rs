//! Relay state: the latest frame, producer bookkeeping, consumer fan-out.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use shared::{FrameReply, StatusNotice, StreamStatus};

/// Outbound queue depth per consumer. A consumer that falls this far behind
/// loses messages instead of stalling the relay.
pub const CONSUMER_QUEUE_DEPTH: usize = 32;

/// Identifier of a registered consumer connection.
pub type ConsumerId = Uuid;

/// Sending half of a consumer's outbound queue. Carries serialized JSON.
pub type ConsumerTx = mpsc::Sender<String>;

/// Shared relay state. One instance per process, constructed in `main` and
/// injected into every connection handler behind an `Arc`.
///
/// All operations take the single internal lock and never block or fail:
/// outbound messages go through bounded queues with `try_send`, so a stuck
/// consumer cannot stall producers or other consumers.
pub struct RelayState {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Latest frame payload. Empty means no frame is held.
    current_frame: String,
    /// Number of currently connected producer connections.
    producer_count: usize,
    /// Open consumer connections, by id.
    consumers: HashMap<ConsumerId, ConsumerTx>,
}

impl Inner {
    fn status(&self) -> StreamStatus {
        if self.producer_count > 0 {
            StreamStatus::ActiveStream
        } else {
            StreamStatus::NoStream
        }
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// A producer connection opened. The first producer flips the stream
    /// active and notifies every consumer; later ones change nothing.
    pub fn producer_connected(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.producer_count += 1;
        tracing::info!("producer connected, total producers: {}", inner.producer_count);
        if inner.producer_count == 1 {
            broadcast(&inner.consumers, &status_text(StreamStatus::ActiveStream));
        }
    }

    /// Replace the held frame. Consumers are not notified; they pull.
    pub fn store_frame(&self, data: String) {
        let mut inner = self.inner.lock().unwrap();
        tracing::debug!("frame updated ({} bytes)", data.len());
        inner.current_frame = data;
    }

    /// A producer connection closed. When the last one leaves, the frame is
    /// cleared and every consumer is notified, under the same lock hold as
    /// the decrement.
    pub fn producer_disconnected(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.producer_count == 0 {
            tracing::warn!("producer disconnect without a matching connect");
            return;
        }
        inner.producer_count -= 1;
        tracing::info!(
            "producer disconnected, total producers: {}",
            inner.producer_count
        );
        if inner.producer_count == 0 {
            inner.current_frame.clear();
            broadcast(&inner.consumers, &status_text(StreamStatus::NoStream));
        }
    }

    /// Register a consumer and queue its initial status notice.
    pub fn consumer_connected(&self, tx: ConsumerTx) -> ConsumerId {
        let mut inner = self.inner.lock().unwrap();
        let id = Uuid::new_v4();
        let _ = tx.try_send(status_text(inner.status()));
        inner.consumers.insert(id, tx);
        tracing::info!("consumer connected, total consumers: {}", inner.consumers.len());
        id
    }

    /// Remove a consumer. Safe to call for an id that is already gone.
    pub fn consumer_disconnected(&self, id: ConsumerId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.consumers.remove(&id).is_some() {
            tracing::info!(
                "consumer disconnected, total consumers: {}",
                inner.consumers.len()
            );
        }
    }

    /// Answer a pull request with the held frame. With no frame held nothing
    /// is sent: consumers learn about stream absence from status notices.
    pub fn frame_request(&self, id: ConsumerId) {
        let inner = self.inner.lock().unwrap();
        if inner.current_frame.is_empty() {
            return;
        }
        let Some(tx) = inner.consumers.get(&id) else {
            return;
        };
        let reply = FrameReply::new(
            inner.current_frame.clone(),
            chrono::Utc::now().timestamp_millis(),
        );
        let _ = tx.try_send(serde_json::to_string(&reply).unwrap());
    }
}

fn status_text(status: StreamStatus) -> String {
    serde_json::to_string(&StatusNotice { status }).unwrap()
}

/// Queue the same serialized text for every consumer. Full or closed queues
/// are skipped; there is no retry and no delivery confirmation.
fn broadcast(consumers: &HashMap<ConsumerId, ConsumerTx>, text: &str) {
    for tx in consumers.values() {
        let _ = tx.try_send(text.to_string());
    }
    tracing::debug!("broadcast to {} consumers: {}", consumers.len(), text);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::Receiver;

    fn attach_consumer(state: &RelayState) -> (ConsumerId, Receiver<String>) {
        let (tx, rx) = mpsc::channel(CONSUMER_QUEUE_DEPTH);
        (state.consumer_connected(tx), rx)
    }

    fn next_status(rx: &mut Receiver<String>) -> StreamStatus {
        let text = rx.try_recv().expect("expected a queued message");
        serde_json::from_str::<StatusNotice>(&text)
            .expect("expected a status notice")
            .status
    }

    fn assert_no_message(rx: &mut Receiver<String>) {
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    fn held_frame(state: &RelayState) -> String {
        state.inner.lock().unwrap().current_frame.clone()
    }

    #[test]
    fn consumer_connect_without_producers_gets_exactly_one_no_stream() {
        let state = RelayState::new();
        let (_id, mut rx) = attach_consumer(&state);
        assert_eq!(next_status(&mut rx), StreamStatus::NoStream);
        assert_no_message(&mut rx);
    }

    #[test]
    fn consumer_connect_during_active_stream_gets_active_status() {
        let state = RelayState::new();
        state.producer_connected();
        let (_id, mut rx) = attach_consumer(&state);
        assert_eq!(next_status(&mut rx), StreamStatus::ActiveStream);
        assert_no_message(&mut rx);
    }

    #[test]
    fn first_producer_broadcasts_active_stream_to_all_consumers_once() {
        let state = RelayState::new();
        let (_a, mut rx_a) = attach_consumer(&state);
        let (_b, mut rx_b) = attach_consumer(&state);
        next_status(&mut rx_a);
        next_status(&mut rx_b);

        state.producer_connected();
        assert_eq!(next_status(&mut rx_a), StreamStatus::ActiveStream);
        assert_eq!(next_status(&mut rx_b), StreamStatus::ActiveStream);
        assert_no_message(&mut rx_a);
        assert_no_message(&mut rx_b);

        // A second producer does not re-announce.
        state.producer_connected();
        assert_no_message(&mut rx_a);
        assert_no_message(&mut rx_b);
    }

    #[test]
    fn frame_update_does_not_notify_consumers() {
        let state = RelayState::new();
        let (_id, mut rx) = attach_consumer(&state);
        next_status(&mut rx);

        state.store_frame("ABC123".to_string());
        assert_eq!(held_frame(&state), "ABC123");
        assert_no_message(&mut rx);
    }

    #[test]
    fn pull_returns_latest_frame_with_timestamp() {
        let state = RelayState::new();
        let (id, mut rx) = attach_consumer(&state);
        next_status(&mut rx);

        state.store_frame("ABC123".to_string());
        state.frame_request(id);

        let text = rx.try_recv().expect("expected a frame reply");
        let reply: FrameReply = serde_json::from_str(&text).unwrap();
        assert_eq!(reply.msg_type, "frame");
        assert_eq!(reply.data, "ABC123");
        assert!(reply.timestamp > 0);
        assert_no_message(&mut rx);
    }

    #[test]
    fn pull_without_frame_sends_nothing() {
        let state = RelayState::new();
        let (id, mut rx) = attach_consumer(&state);
        next_status(&mut rx);

        state.frame_request(id);
        assert_no_message(&mut rx);
    }

    #[test]
    fn pull_from_unknown_consumer_is_ignored() {
        let state = RelayState::new();
        state.store_frame("ABC123".to_string());
        state.frame_request(Uuid::new_v4());
    }

    #[test]
    fn only_last_producer_departure_clears_frame_and_notifies() {
        let state = RelayState::new();
        let (_id, mut rx) = attach_consumer(&state);
        next_status(&mut rx);

        state.producer_connected();
        state.producer_connected();
        next_status(&mut rx);
        state.store_frame("ABC123".to_string());

        // 2 -> 1: no broadcast, frame retained.
        state.producer_disconnected();
        assert_no_message(&mut rx);
        assert_eq!(held_frame(&state), "ABC123");

        // 1 -> 0: frame cleared, exactly one no_stream broadcast.
        state.producer_disconnected();
        assert_eq!(held_frame(&state), "");
        assert_eq!(next_status(&mut rx), StreamStatus::NoStream);
        assert_no_message(&mut rx);
    }

    #[test]
    fn producer_count_never_goes_negative() {
        let state = RelayState::new();
        state.producer_disconnected();
        assert_eq!(state.inner.lock().unwrap().producer_count, 0);

        // The next real connect is still a 0 -> 1 transition.
        let (_id, mut rx) = attach_consumer(&state);
        next_status(&mut rx);
        state.producer_connected();
        assert_eq!(next_status(&mut rx), StreamStatus::ActiveStream);
    }

    #[test]
    fn consumer_disconnect_is_idempotent() {
        let state = RelayState::new();
        let (id_a, _rx_a) = attach_consumer(&state);
        let (_id_b, _rx_b) = attach_consumer(&state);

        state.consumer_disconnected(id_a);
        assert_eq!(state.inner.lock().unwrap().consumers.len(), 1);
        state.consumer_disconnected(id_a);
        assert_eq!(state.inner.lock().unwrap().consumers.len(), 1);
    }

    #[test]
    fn broadcast_skips_full_and_closed_queues() {
        let state = RelayState::new();
        let (_healthy, mut rx_healthy) = attach_consumer(&state);
        next_status(&mut rx_healthy);

        // This consumer's queue is already full with the initial notice.
        let (full_tx, mut full_rx) = mpsc::channel(1);
        state.consumer_connected(full_tx);

        // This consumer's receiving half is gone.
        let (closed_tx, closed_rx) = mpsc::channel(CONSUMER_QUEUE_DEPTH);
        state.consumer_connected(closed_tx);
        drop(closed_rx);

        state.producer_connected();

        assert_eq!(next_status(&mut rx_healthy), StreamStatus::ActiveStream);
        assert_eq!(next_status(&mut full_rx), StreamStatus::NoStream);
        assert_no_message(&mut full_rx);
    }
}
