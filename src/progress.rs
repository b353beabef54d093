//! Per-backend progress event broker
//!
//! Every lifecycle transition and retry is published here. The broker keeps
//! an ordered, append-only log for the lifetime of the backend and replays
//! it in full to subscribers that join late, so a progress page always sees
//! the complete history regardless of when it connects.

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Headroom on top of the replayed log for live events. A subscriber that
/// falls this far behind is dropped rather than allowed to stall others.
const LIVE_BUFFER: usize = 256;

/// One lifecycle progress event: a kind tag plus an opaque JSON payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub kind: String,
    pub data: serde_json::Value,
}

impl ProgressEvent {
    /// Event with no payload
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: serde_json::Value::Null,
        }
    }

    /// Event carrying a payload (e.g. the bootstrap step checklist)
    pub fn with_data(kind: &str, data: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }
}

enum BrokerCmd {
    Publish(ProgressEvent),
    Subscribe(oneshot::Sender<mpsc::Receiver<ProgressEvent>>),
}

/// Handle to one backend's progress broker task
#[derive(Clone)]
pub struct ProgressBroker {
    tx: mpsc::Sender<BrokerCmd>,
}

impl ProgressBroker {
    /// Spawn a new broker task and return its handle
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run(rx));
        Self { tx }
    }

    /// Append an event to the log and deliver it to all subscribers
    pub async fn publish(&self, event: ProgressEvent) {
        // The broker only goes away when the backend does; a send failure
        // then just means nobody is listening anymore.
        let _ = self.tx.send(BrokerCmd::Publish(event)).await;
    }

    /// Register a subscriber. The returned stream first yields the entire
    /// existing log in original order, then live events.
    pub async fn subscribe(&self) -> mpsc::Receiver<ProgressEvent> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(BrokerCmd::Subscribe(reply_tx)).await.is_ok() {
            if let Ok(rx) = reply_rx.await {
                return rx;
            }
        }
        // Broker is gone: hand back a stream that is already closed.
        let (_tx, rx) = mpsc::channel(1);
        rx
    }
}

async fn run(mut rx: mpsc::Receiver<BrokerCmd>) {
    let mut log: Vec<ProgressEvent> = Vec::new();
    let mut subscribers: Vec<mpsc::Sender<ProgressEvent>> = Vec::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            BrokerCmd::Publish(event) => {
                log.push(event.clone());
                subscribers.retain(|sub| match sub.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        warn!(kind = %event.kind, "Dropping slow progress subscriber");
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
            BrokerCmd::Subscribe(reply) => {
                // Sized so the full replay always fits; replay happens
                // before the broker processes any further publish, which
                // is what guarantees gap-free ordering for late joiners.
                let (sub_tx, sub_rx) = mpsc::channel(log.len() + LIVE_BUFFER);
                for event in &log {
                    let _ = sub_tx.try_send(event.clone());
                }
                debug!(replayed = log.len(), "Progress subscriber registered");
                if reply.send(sub_rx).is_ok() {
                    subscribers.push(sub_tx);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_live_delivery_preserves_order() {
        let broker = ProgressBroker::spawn();
        let mut sub = broker.subscribe().await;

        for kind in ["connection_start", "connection_try", "connection_established"] {
            broker.publish(ProgressEvent::new(kind)).await;
        }

        assert_eq!(sub.recv().await.unwrap().kind, "connection_start");
        assert_eq!(sub.recv().await.unwrap().kind, "connection_try");
        assert_eq!(sub.recv().await.unwrap().kind, "connection_established");
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_full_replay() {
        let broker = ProgressBroker::spawn();

        for i in 0..5 {
            broker
                .publish(ProgressEvent::with_data("step", serde_json::json!(i)))
                .await;
        }

        let mut sub = broker.subscribe().await;
        broker.publish(ProgressEvent::new("connection_success")).await;

        for i in 0..5 {
            let event = sub.recv().await.unwrap();
            assert_eq!(event.kind, "step");
            assert_eq!(event.data, serde_json::json!(i));
        }
        assert_eq!(sub.recv().await.unwrap().kind, "connection_success");
    }

    #[tokio::test]
    async fn test_replay_larger_than_live_buffer() {
        let broker = ProgressBroker::spawn();

        for i in 0..(LIVE_BUFFER * 2) {
            broker
                .publish(ProgressEvent::with_data("e", serde_json::json!(i)))
                .await;
        }

        let mut sub = broker.subscribe().await;
        for i in 0..(LIVE_BUFFER * 2) {
            assert_eq!(sub.recv().await.unwrap().data, serde_json::json!(i));
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let broker = ProgressBroker::spawn();

        // This subscriber never reads; it gets dropped once its queue fills.
        let _stalled = broker.subscribe().await;
        let mut active = broker.subscribe().await;

        for i in 0..(LIVE_BUFFER + 10) {
            broker
                .publish(ProgressEvent::with_data("e", serde_json::json!(i)))
                .await;
            // Keep draining so the active subscriber never falls behind.
            assert_eq!(active.recv().await.unwrap().data, serde_json::json!(i));
        }
    }

    #[tokio::test]
    async fn test_event_serializes_to_json() {
        let event = ProgressEvent::with_data(
            "bootstrap_status",
            serde_json::json!({"steps": [{"description": "install", "status": "done"}]}),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"bootstrap_status\""));
        assert!(json.contains("\"status\":\"done\""));
    }
}
