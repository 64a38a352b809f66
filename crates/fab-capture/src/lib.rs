//! Capture pipeline for Fab entitlement traffic.
//!
//! The crate decorates a [`Transport`] so that responses from the
//! entitlements search endpoint are tee'd onto a page-local broadcast
//! bus, and relays those broadcasts to the bridge server's command
//! channel. The decorated call path stays observationally transparent:
//! callers get the same responses and errors whether or not anything is
//! being captured.

pub mod bus;
pub mod http;
pub mod intercept;
pub mod relay;
pub mod sniff;
pub mod transport;

pub use bus::{PageBus, PageMessage, SourceId};
pub use http::HttpCommandSink;
pub use intercept::{EventedClient, SniffingTransport, TransferEvent};
pub use relay::{CommandSink, Relay};
pub use sniff::{SniffConfig, DEFAULT_TARGET_PATH};
pub use transport::{FetchRequest, FetchResponse, ReqwestTransport, Transport, TransportError};
