use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};

use fab_protocol::RecordSummary;

use super::util::{client, fetch_entitlements, format_relative};

#[derive(Args)]
pub struct StatusArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// Emit raw JSON instead of a formatted summary
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &StatusArgs) -> Result<()> {
    let health_url = format!("{}/healthz", args.base.trim_end_matches('/'));
    let health: Value = client(args.timeout)?
        .get(&health_url)
        .send()
        .with_context(|| format!("reaching {health_url}"))?
        .error_for_status()
        .context("health endpoint returned an error status")?
        .json()
        .context("parsing health response")?;

    let records = fetch_entitlements(&args.base, args.timeout)?;
    let last_created = latest_created_at(&records);

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "service": health,
                "items": records.len(),
                "lastCreatedAt": last_created,
            }))
            .context("rendering status")?
        );
        return Ok(());
    }

    let version = health["version"].as_str().unwrap_or("unknown");
    println!("service: ok (fab-server {version})");
    println!("items: {}", records.len());
    match last_created {
        Some(ts) => println!("last update: {} ({ts})", format_relative(&ts)),
        None => println!("last update: never"),
    }
    Ok(())
}

/// Newest `createdAt` across the records: when the latest item was
/// acquired, not when it was captured.
fn latest_created_at(records: &[Value]) -> Option<String> {
    records
        .iter()
        .filter_map(|r| RecordSummary::from_record(r).created_at)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recency_tracks_created_at_not_the_capture_stamp() {
        // Acquired long ago, captured just now: the acquisition date wins.
        let records = vec![
            json!({
                "uid": "a",
                "createdAt": "2024-01-05T00:00:00Z",
                "savedAt": "2026-08-22T12:00:00.000Z"
            }),
            json!({
                "uid": "b",
                "createdAt": "2023-11-30T00:00:00Z",
                "savedAt": "2026-08-22T12:01:00.000Z"
            }),
        ];
        assert_eq!(
            latest_created_at(&records).as_deref(),
            Some("2024-01-05T00:00:00Z")
        );
    }

    #[test]
    fn recency_is_absent_without_creation_dates() {
        let records = vec![json!({"uid": "a", "savedAt": "2026-08-22T12:00:00.000Z"})];
        assert_eq!(latest_created_at(&records), None);
        assert_eq!(latest_created_at(&[]), None);
    }
}
