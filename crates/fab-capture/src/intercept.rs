use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::PageBus;
use crate::sniff::SniffConfig;
use crate::transport::{FetchRequest, FetchResponse, Transport, TransportError};

/// Decorator that watches responses passing through a [`Transport`] and
/// tees entitlement results onto the page bus.
///
/// The wrapped exchange is untouched: the caller sees the same response
/// or error either way, and a peek that finds nothing posts nothing.
pub struct SniffingTransport<T> {
    inner: T,
    config: SniffConfig,
    bus: PageBus,
}

impl<T: Transport> SniffingTransport<T> {
    pub fn new(inner: T, bus: PageBus) -> Self {
        SniffingTransport::with_config(inner, bus, SniffConfig::from_env())
    }

    pub fn with_config(inner: T, bus: PageBus, config: SniffConfig) -> Self {
        SniffingTransport { inner, config, bus }
    }
}

#[async_trait]
impl<T: Transport> Transport for SniffingTransport<T> {
    async fn execute(&self, req: FetchRequest) -> Result<FetchResponse, TransportError> {
        let resp = self.inner.execute(req).await?;
        if let Some(results) = self.config.extract(&resp) {
            tracing::debug!(count = results.len(), url = %resp.url, "captured entitlement results");
            self.bus.post_results(results);
        }
        Ok(resp)
    }
}

/// Outcome handed to an [`EventedClient`] listener.
#[derive(Debug)]
pub enum TransferEvent {
    Load(FetchResponse),
    Error(TransportError),
}

/// Callback-flavored twin of [`SniffingTransport`] for call sites that
/// hand off a listener instead of awaiting the exchange.
pub struct EventedClient<T> {
    inner: Arc<T>,
    config: SniffConfig,
    bus: PageBus,
}

impl<T: Transport + 'static> EventedClient<T> {
    pub fn new(inner: T, bus: PageBus) -> Self {
        EventedClient::with_config(inner, bus, SniffConfig::from_env())
    }

    pub fn with_config(inner: T, bus: PageBus, config: SniffConfig) -> Self {
        EventedClient {
            inner: Arc::new(inner),
            config,
            bus,
        }
    }

    /// Start the exchange. The listener fires exactly once, after any
    /// capture of the response has already been posted.
    pub fn send<F>(&self, req: FetchRequest, listener: F) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(TransferEvent) + Send + 'static,
    {
        let inner = self.inner.clone();
        let config = self.config.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            match inner.execute(req).await {
                Ok(resp) => {
                    if let Some(results) = config.extract(&resp) {
                        tracing::debug!(count = results.len(), url = %resp.url, "captured entitlement results");
                        bus.post_results(results);
                    }
                    listener(TransferEvent::Load(resp));
                }
                Err(err) => listener(TransferEvent::Error(err)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    struct CannedTransport {
        response: Result<FetchResponse, ()>,
    }

    impl CannedTransport {
        fn ok(resp: FetchResponse) -> Self {
            CannedTransport {
                response: Ok(resp),
            }
        }

        fn failing() -> Self {
            CannedTransport { response: Err(()) }
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn execute(&self, _req: FetchRequest) -> Result<FetchResponse, TransportError> {
            match &self.response {
                Ok(resp) => Ok(resp.clone()),
                Err(()) => Err(TransportError::Method("BOGUS".to_string())),
            }
        }
    }

    fn entitlements_response() -> FetchResponse {
        FetchResponse {
            url: "https://www.fab.com/i/library/entitlements/search?count=24".to_string(),
            status: 200,
            headers: vec![(
                "content-type".to_string(),
                "application/json".to_string(),
            )],
            body: Bytes::from(
                json!({"results": [{"uid": "a"}, {"uid": "b"}]}).to_string(),
            ),
        }
    }

    fn plain_response() -> FetchResponse {
        FetchResponse {
            url: "https://www.fab.com/home".to_string(),
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: Bytes::from_static(b"<html></html>"),
        }
    }

    #[tokio::test]
    async fn response_passes_through_untouched() {
        let bus = PageBus::new(8);
        let mut rx = bus.subscribe();
        let transport = SniffingTransport::with_config(
            CannedTransport::ok(entitlements_response()),
            bus.clone(),
            SniffConfig::default(),
        );

        let resp = transport
            .execute(FetchRequest::get("https://www.fab.com/i/library/entitlements/search"))
            .await
            .expect("response");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, entitlements_response().body);

        let msg = rx.try_recv().expect("broadcast");
        assert_eq!(msg.source, bus.id());
        assert_eq!(msg.results.len(), 2);
    }

    #[tokio::test]
    async fn unrelated_traffic_is_not_broadcast() {
        let bus = PageBus::new(8);
        let mut rx = bus.subscribe();
        let transport = SniffingTransport::with_config(
            CannedTransport::ok(plain_response()),
            bus,
            SniffConfig::default(),
        );

        let resp = transport
            .execute(FetchRequest::get("https://www.fab.com/home"))
            .await
            .expect("response");
        assert_eq!(resp.status, 200);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_errors_pass_through_without_broadcast() {
        let bus = PageBus::new(8);
        let mut rx = bus.subscribe();
        let transport = SniffingTransport::with_config(
            CannedTransport::failing(),
            bus,
            SniffConfig::default(),
        );

        let err = transport
            .execute(FetchRequest::get("https://www.fab.com/i/library/entitlements/search"))
            .await
            .expect_err("error");
        assert!(matches!(err, TransportError::Method(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn evented_listener_fires_after_capture() {
        let bus = PageBus::new(8);
        let mut rx = bus.subscribe();
        let client = EventedClient::with_config(
            CannedTransport::ok(entitlements_response()),
            bus,
            SniffConfig::default(),
        );

        let (tx, done) = tokio::sync::oneshot::channel();
        let handle = client.send(
            FetchRequest::get("https://www.fab.com/i/library/entitlements/search"),
            move |event| {
                let _ = tx.send(event);
            },
        );
        handle.await.expect("task");

        // Broadcast already posted by the time the listener saw the load.
        assert_eq!(rx.try_recv().expect("broadcast").results.len(), 2);
        match done.await.expect("listener") {
            TransferEvent::Load(resp) => assert_eq!(resp.status, 200),
            other => panic!("expected load, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn evented_listener_sees_errors() {
        let bus = PageBus::new(8);
        let client =
            EventedClient::with_config(CannedTransport::failing(), bus, SniffConfig::default());

        let (tx, done) = tokio::sync::oneshot::channel();
        client
            .send(FetchRequest::get("https://anywhere.test/x"), move |event| {
                let _ = tx.send(event);
            })
            .await
            .expect("task");
        assert!(matches!(
            done.await.expect("listener"),
            TransferEvent::Error(TransportError::Method(_))
        ));
    }
}
