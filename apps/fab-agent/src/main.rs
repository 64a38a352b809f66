use tracing_subscriber::{fmt, EnvFilter};

use fab_capture::{
    FetchRequest, HttpCommandSink, PageBus, Relay, ReqwestTransport, SniffingTransport, Transport,
};

/// Fetch the given URLs through the capture pipeline. Responses from the
/// entitlements search endpoint are picked up on the way through and
/// forwarded to the bridge server; everything else passes untouched.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: fab-agent <url> [<url> ...]");
        std::process::exit(2);
    }

    let base =
        std::env::var("FAB_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8787".to_string());
    let bus = PageBus::new(64);
    let relay = Relay::new(&bus, HttpCommandSink::new(base.as_str()));
    let relay_task = tokio::spawn(relay.run());
    tracing::info!("fab-agent forwarding captures to {}", base);

    let transport = SniffingTransport::new(ReqwestTransport::new(), bus.clone());
    for url in urls {
        match transport.execute(FetchRequest::get(&url)).await {
            Ok(resp) => {
                tracing::info!(status = resp.status, bytes = resp.body.len(), %url, "fetched")
            }
            Err(err) => tracing::warn!(%url, "fetch failed: {}", err),
        }
    }

    // Dropping every bus handle lets the relay drain and stop.
    drop(transport);
    drop(bus);
    relay_task.await?;
    Ok(())
}
