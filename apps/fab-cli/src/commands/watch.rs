use std::io::{BufRead, BufReader};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use fab_topics::{TOPIC_ENTITLEMENTS_CLEARED, TOPIC_ENTITLEMENTS_UPDATED};

use super::util::{events_url, fetch_entitlements, streaming_client};

#[derive(Args)]
pub struct WatchArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds for store lookups triggered by events
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// Only stream events whose kind starts with this prefix (CSV)
    #[arg(long)]
    pub prefix: Option<String>,
    /// Poll the store every N seconds instead of streaming
    #[arg(long, value_name = "SECS", conflicts_with = "prefix")]
    pub poll: Option<u64>,
    /// Emit raw event JSON lines
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &WatchArgs) -> Result<()> {
    if let Some(secs) = args.poll {
        return poll_loop(args, secs.max(1));
    }
    // Start from a snapshot; the stream only carries changes from here on.
    if !args.json {
        if let Some(count) = snapshot_count(&args.base, args.timeout) {
            println!("store has {count} entitlement(s)");
        }
    }
    stream_loop(args)
}

/// Fallback for environments where a long-lived stream is impractical.
fn poll_loop(args: &WatchArgs, secs: u64) -> Result<()> {
    let mut last: Option<usize> = None;
    loop {
        if let Some(count) = snapshot_count(&args.base, args.timeout) {
            if last != Some(count) {
                println!("store has {count} entitlement(s)");
                last = Some(count);
            }
        }
        thread::sleep(Duration::from_secs(secs));
    }
}

/// Store size right now; an unreachable server is not fatal to the watch.
fn snapshot_count(base: &str, timeout: u64) -> Option<usize> {
    match fetch_entitlements(base, timeout) {
        Ok(records) => Some(records.len()),
        Err(err) => {
            tracing::debug!(%err, "snapshot fetch failed");
            None
        }
    }
}

fn stream_loop(args: &WatchArgs) -> Result<()> {
    loop {
        match stream_once(args) {
            Ok(()) => eprintln!("stream ended; reconnecting"),
            Err(err) => eprintln!("stream error: {err:#}; reconnecting"),
        }
        thread::sleep(Duration::from_secs(2));
    }
}

fn stream_once(args: &WatchArgs) -> Result<()> {
    let url = events_url(&args.base, args.prefix.as_deref());
    let resp = streaming_client()?
        .get(&url)
        .header("accept", "text/event-stream")
        .send()
        .with_context(|| format!("connecting to {url}"))?
        .error_for_status()
        .context("event stream returned an error status")?;

    let reader = BufReader::new(resp);
    let mut event_kind = String::new();
    for line in reader.lines() {
        let line = line.context("reading event stream")?;
        if let Some(rest) = line.strip_prefix("event:") {
            event_kind = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            print_event(args, &event_kind, rest.trim());
        }
        // Everything else is frame separators and keep-alive comments.
    }
    Ok(())
}

fn print_event(args: &WatchArgs, kind: &str, data: &str) {
    if args.json {
        println!("{data}");
        return;
    }
    let env: Value = serde_json::from_str(data).unwrap_or(Value::Null);
    let time = env["time"].as_str().unwrap_or("-");
    if kind == TOPIC_ENTITLEMENTS_UPDATED {
        let count = env["payload"]["count"].as_u64().unwrap_or(0);
        match fetch_entitlements(&args.base, args.timeout) {
            Ok(records) => println!(
                "[{time}] saved {count} entitlement(s), store now {}",
                records.len()
            ),
            Err(_) => println!("[{time}] saved {count} entitlement(s)"),
        }
    } else if kind == TOPIC_ENTITLEMENTS_CLEARED {
        println!("[{time}] store cleared");
    } else {
        println!("[{time}] {kind} {}", env["payload"]);
    }
}
