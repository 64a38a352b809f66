use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use fab_protocol::RESULTS_BROADCAST_KIND;

/// Identity of the party that posted a broadcast. Consumers filter on it
/// because the channel is shared with arbitrary other tenants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(Uuid);

impl SourceId {
    pub fn random() -> Self {
        SourceId(Uuid::new_v4())
    }
}

/// One broadcast on the page channel.
#[derive(Debug, Clone)]
pub struct PageMessage {
    pub source: SourceId,
    pub kind: String,
    pub results: Vec<Value>,
}

/// Broadcast channel standing in for the page a capture runs on.
///
/// Cloned handles share one identity, so everything posted through them
/// carries the same `source`. Posting is fire-and-forget; with nobody
/// subscribed a message is simply dropped.
#[derive(Clone)]
pub struct PageBus {
    id: SourceId,
    tx: broadcast::Sender<PageMessage>,
}

impl PageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        PageBus {
            id: SourceId::random(),
            tx,
        }
    }

    /// Identity attached to results posted through this bus.
    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.tx.subscribe()
    }

    /// Post a captured results batch. Empty batches are not posted.
    pub fn post_results(&self, results: Vec<Value>) {
        if results.is_empty() {
            return;
        }
        tracing::trace!(count = results.len(), "posting results broadcast");
        let _ = self.tx.send(PageMessage {
            source: self.id,
            kind: RESULTS_BROADCAST_KIND.to_string(),
            results,
        });
    }

    /// Post an arbitrary message, foreign `source` included. This is how
    /// other tenants of the channel look to a consumer.
    pub fn send_raw(&self, msg: PageMessage) {
        let _ = self.tx.send(msg);
    }
}
