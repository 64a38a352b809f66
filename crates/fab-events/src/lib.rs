use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Event envelope pushed to observer surfaces (RFC3339 time).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    /// Envelope stamped with the current time.
    pub fn now(kind: &str, payload: Value) -> Self {
        Envelope {
            time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind: kind.to_string(),
            payload,
        }
    }
}

/// A simple broadcast bus for JSON-serializable events.
///
/// Publishing never blocks and never fails: subscribers that lag are
/// skipped by the channel, and an event with no subscribers at all is
/// dropped on the floor. Store mutations must not stall on observers.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    /// Number of currently attached observers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let val =
            serde_json::to_value(payload).unwrap_or_else(|_| serde_json::json!({"_ser":"error"}));
        let delivered = self.tx.send(Envelope::now(kind, val)).unwrap_or(0);
        tracing::trace!(kind, delivered, "event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish("demo.kind", &serde_json::json!({"count": 3}));
        let env = rx.recv().await.expect("envelope");
        assert_eq!(env.kind, "demo.kind");
        assert_eq!(env.payload["count"], 3);
        assert!(env.time.ends_with('Z'));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = Bus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish("demo.kind", &serde_json::json!({}));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = Bus::new(1);
        let mut rx = bus.subscribe();
        bus.publish("demo.kind", &serde_json::json!({"n": 1}));
        bus.publish("demo.kind", &serde_json::json!({"n": 2}));
        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert_eq!(missed, 1),
            other => panic!("expected lag, got {other:?}"),
        }
        let env = rx.recv().await.expect("latest envelope");
        assert_eq!(env.payload["n"], 2);
    }
}
