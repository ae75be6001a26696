//! Per-session broadcast channels and lifecycle
//!
//! Each session gets its own channel, created on first publish or
//! subscribe and torn down a grace period after the terminal event. The
//! bus lock is held across sequence assignment, replay-window append, and
//! broadcast, so subscribers attached under the same lock observe a
//! gapless, duplicate-free stream.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use leseance::SessionId;

use crate::event::{EventKind, SessionEvent};

/// Per-subscriber broadcast buffer; a subscriber that falls further behind
/// than this is disconnected rather than stalling the publisher.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Events kept for late subscribers of a non-terminal session.
pub const DEFAULT_REPLAY_WINDOW: usize = 64;

/// How long a terminal session's channel lingers for attached subscribers.
pub const DEFAULT_TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// Teardown re-checks before the channel is dropped regardless.
const MAX_TEARDOWN_CHECKS: u32 = 4;

/// Publish sink the orchestrator depends on; keeps it transport-agnostic.
pub trait EventSink: Send + Sync {
    /// Publish one event for `session_id`, assigning its sequence number.
    fn publish(
        &self,
        session_id: &SessionId,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> SessionEvent;
}

struct SessionChannel {
    tx: broadcast::Sender<SessionEvent>,
    next_sequence: u64,
    replay: VecDeque<SessionEvent>,
    terminal: bool,
}

impl SessionChannel {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            next_sequence: 0,
            replay: VecDeque::new(),
            terminal: false,
        }
    }
}

/// Multi-subscriber, per-session event fan-out.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<Mutex<HashMap<SessionId, SessionChannel>>>,
    capacity: usize,
    replay_window: usize,
    teardown_grace: Duration,
}

impl EventBus {
    /// Create a bus with default buffering.
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_CHANNEL_CAPACITY,
            DEFAULT_REPLAY_WINDOW,
            DEFAULT_TEARDOWN_GRACE,
        )
    }

    /// Create a bus with explicit buffer sizes and teardown grace.
    pub fn with_settings(capacity: usize, replay_window: usize, teardown_grace: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            replay_window,
            teardown_grace,
        }
    }

    /// Whether a live channel currently exists for `session_id`.
    pub fn is_active(&self, session_id: &SessionId) -> bool {
        self.channels
            .lock()
            .expect("event bus mutex poisoned")
            .contains_key(session_id)
    }

    /// Attach an observer, replaying the recent window first.
    ///
    /// The replay snapshot and the live receiver are taken under one lock,
    /// so the handed-back stream has no gap and no duplicate between them.
    pub fn subscribe(&self, session_id: &SessionId) -> EventStream {
        let mut channels = self.channels.lock().expect("event bus mutex poisoned");
        let channel = channels
            .entry(session_id.clone())
            .or_insert_with(|| SessionChannel::new(self.capacity));
        let pending: VecDeque<SessionEvent> = channel.replay.iter().cloned().collect();
        let rx = channel.tx.subscribe();
        debug!(session = %session_id, replayed = pending.len(), "subscriber attached");
        EventStream {
            pending,
            rx,
            lagged: false,
        }
    }

    fn spawn_teardown(&self, session_id: SessionId) {
        let channels = Arc::clone(&self.channels);
        let grace = self.teardown_grace;
        tokio::spawn(async move {
            for _ in 0..MAX_TEARDOWN_CHECKS {
                tokio::time::sleep(grace).await;
                let subscribers = channels
                    .lock()
                    .expect("event bus mutex poisoned")
                    .get(&session_id)
                    .map(|c| c.tx.receiver_count())
                    .unwrap_or(0);
                if subscribers == 0 {
                    break;
                }
            }
            channels
                .lock()
                .expect("event bus mutex poisoned")
                .remove(&session_id);
            debug!(session = %session_id, "session channel torn down");
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn publish(
        &self,
        session_id: &SessionId,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> SessionEvent {
        let event = {
            let mut channels = self.channels.lock().expect("event bus mutex poisoned");
            let channel = channels
                .entry(session_id.clone())
                .or_insert_with(|| SessionChannel::new(self.capacity));
            if channel.terminal {
                warn!(session = %session_id, "event published after session terminal");
            }

            let event = SessionEvent {
                session_id: session_id.clone(),
                sequence: channel.next_sequence,
                kind,
                payload,
                timestamp: Utc::now(),
            };
            channel.next_sequence += 1;

            channel.replay.push_back(event.clone());
            while channel.replay.len() > self.replay_window {
                channel.replay.pop_front();
            }

            // No receivers is fine; the replay window covers late arrivals.
            let _ = channel.tx.send(event.clone());

            if kind.is_terminal() {
                channel.terminal = true;
            }
            event
        };

        if kind.is_terminal() {
            self.spawn_teardown(session_id.clone());
        }
        event
    }
}

/// A subscriber's view of one session's events.
pub struct EventStream {
    pending: VecDeque<SessionEvent>,
    rx: broadcast::Receiver<SessionEvent>,
    lagged: bool,
}

impl EventStream {
    /// Next event, or `None` once the stream ends.
    ///
    /// The stream ends when the channel is torn down, or when this
    /// subscriber fell behind its bounded buffer ([`Self::lagged`] is then
    /// set and the subscriber should resynchronize from the persisted step
    /// history).
    pub async fn next(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "subscriber lagged past its buffer; disconnecting");
                self.lagged = true;
                None
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    /// Whether the stream ended because this subscriber fell behind.
    pub fn lagged(&self) -> bool {
        self.lagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sid(raw: &str) -> SessionId {
        SessionId::from_string(raw)
    }

    #[tokio::test]
    async fn live_subscriber_sees_ordered_sequence() {
        let bus = EventBus::new();
        let session = sid("s-order");
        let mut stream = bus.subscribe(&session);

        for i in 0..5 {
            bus.publish(&session, EventKind::StageProgress, json!({"attempt": i}));
        }

        let mut last = None;
        for _ in 0..5 {
            let event = stream.next().await.expect("event");
            if let Some(prev) = last {
                assert!(event.sequence > prev, "sequence must increase");
            }
            last = Some(event.sequence);
        }
        assert_eq!(last, Some(4));
    }

    #[tokio::test]
    async fn late_subscriber_replays_recent_events() {
        let bus = EventBus::new();
        let session = sid("s-late");

        bus.publish(&session, EventKind::StageStarted, json!({"stage": "format"}));
        bus.publish(&session, EventKind::StageCompleted, json!({"stage": "format"}));

        let mut stream = bus.subscribe(&session);
        let first = stream.next().await.expect("replayed event");
        let second = stream.next().await.expect("replayed event");
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.kind, EventKind::StageCompleted);
    }

    #[tokio::test]
    async fn replay_window_is_bounded() {
        let bus = EventBus::with_settings(256, 4, DEFAULT_TEARDOWN_GRACE);
        let session = sid("s-window");

        for i in 0..10 {
            bus.publish(&session, EventKind::StageProgress, json!({"i": i}));
        }

        let mut stream = bus.subscribe(&session);
        let first = stream.next().await.expect("replayed event");
        assert_eq!(first.sequence, 6, "only the last 4 events are replayable");
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_not_publisher() {
        let bus = EventBus::with_settings(4, 64, DEFAULT_TEARDOWN_GRACE);
        let session = sid("s-slow");
        let mut stream = bus.subscribe(&session);

        // Publisher keeps going far past the subscriber buffer.
        for i in 0..32 {
            bus.publish(&session, EventKind::StageProgress, json!({"i": i}));
        }

        assert!(stream.next().await.is_none());
        assert!(stream.lagged());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_channel_is_torn_down_after_grace() {
        let bus = EventBus::with_settings(16, 16, Duration::from_millis(50));
        let session = sid("s-teardown");

        bus.publish(&session, EventKind::SessionTerminal, json!({"status": "completed"}));
        assert!(bus.is_active(&session));

        tokio::time::sleep(Duration::from_millis(60)).await;
        // Let the teardown task run.
        tokio::task::yield_now().await;
        assert!(!bus.is_active(&session));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_resubscriber_sees_exactly_one_terminal() {
        let bus = EventBus::with_settings(16, 16, Duration::from_millis(50));
        let session = sid("s-once");

        bus.publish(&session, EventKind::StageCompleted, json!({"stage": "synthesize"}));
        bus.publish(&session, EventKind::SessionTerminal, json!({"status": "completed"}));

        // A subscriber that disconnects and comes back before teardown.
        let mut stream = bus.subscribe(&session);
        let mut terminals = 0;
        while let Some(event) = stream.next().await {
            if event.kind.is_terminal() {
                terminals += 1;
            }
        }
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn sessions_do_not_share_sequences() {
        let bus = EventBus::new();
        let a = sid("s-a");
        let b = sid("s-b");

        let first_a = bus.publish(&a, EventKind::StageStarted, json!({}));
        let first_b = bus.publish(&b, EventKind::StageStarted, json!({}));
        assert_eq!(first_a.sequence, 0);
        assert_eq!(first_b.sequence, 0);
    }
}
