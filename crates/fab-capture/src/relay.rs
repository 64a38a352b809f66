use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use fab_protocol::{Command, Reply, RESULTS_BROADCAST_KIND};

use crate::bus::{PageBus, PageMessage, SourceId};

/// Where the relay forwards captured batches.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: Command) -> Result<Reply>;
}

/// Pump between the page channel and the store command channel.
///
/// Forwarding is at-most-once: a batch the sink rejects or never
/// receives is logged and dropped, not retried. The page bus keeps no
/// history, so there is nothing to replay anyway.
pub struct Relay<S> {
    rx: broadcast::Receiver<PageMessage>,
    accept_from: SourceId,
    sink: S,
}

impl<S: CommandSink> Relay<S> {
    /// Attach to `bus`, accepting only broadcasts posted through it.
    pub fn new(bus: &PageBus, sink: S) -> Self {
        Relay {
            rx: bus.subscribe(),
            accept_from: bus.id(),
            sink,
        }
    }

    /// Drive the relay until every handle of the bus is gone.
    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(msg) => self.forward(msg).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "page bus lagged; broadcasts dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn forward(&self, msg: PageMessage) {
        if msg.source != self.accept_from {
            tracing::trace!("ignoring broadcast from foreign source");
            return;
        }
        if msg.kind != RESULTS_BROADCAST_KIND {
            return;
        }
        if msg.results.is_empty() {
            return;
        }
        let count = msg.results.len();
        match self
            .sink
            .send(Command::SaveEntitlements { items: msg.results })
            .await
        {
            Ok(reply) if reply.is_ok() => {
                tracing::debug!(count, "relayed entitlement batch");
            }
            Ok(reply) => {
                tracing::warn!(
                    count,
                    error = reply.error().unwrap_or("unknown"),
                    "store rejected entitlement batch"
                );
            }
            Err(err) => {
                tracing::warn!(count, %err, "failed to relay entitlement batch");
            }
        }
    }
}
