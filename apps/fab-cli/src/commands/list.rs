use anyhow::{Context, Result};
use clap::Args;

use fab_protocol::{listing_url, RecordSummary};

use super::util::{fetch_entitlements, format_relative};

#[derive(Args)]
pub struct ListArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// Show at most this many records
    #[arg(long)]
    pub limit: Option<usize>,
    /// Emit raw JSON instead of a formatted listing
    #[arg(long)]
    pub json: bool,
    /// Pretty-print JSON output (requires --json)
    #[arg(long, requires = "json")]
    pub pretty: bool,
    /// Also print the public listing URL for each record
    #[arg(long, conflicts_with = "json")]
    pub urls: bool,
}

pub fn run(args: &ListArgs) -> Result<()> {
    let mut records = fetch_entitlements(&args.base, args.timeout)?;
    let total = records.len();
    if let Some(limit) = args.limit {
        records.truncate(limit);
    }

    if args.json {
        let rendered = if args.pretty {
            serde_json::to_string_pretty(&records)
        } else {
            serde_json::to_string(&records)
        }
        .context("rendering records")?;
        println!("{rendered}");
        return Ok(());
    }

    for record in &records {
        let summary = RecordSummary::from_record(record);
        println!("{}", summary_line(&summary));
        if args.urls {
            if let Some(uid) = summary.uid.as_deref() {
                println!("    {}", listing_url(uid));
            }
        }
    }
    if records.len() < total {
        println!("... and {} more", total - records.len());
    }
    println!("{total} entitlement(s)");
    Ok(())
}

fn summary_line(summary: &RecordSummary) -> String {
    let title = summary.title.as_deref().unwrap_or("(untitled)");
    let uid = summary.uid.as_deref().unwrap_or("-");
    let price = match (summary.price, summary.currency.as_deref()) {
        (Some(p), Some(c)) => format!("{p:.2} {c}"),
        (Some(p), None) => format!("{p:.2}"),
        _ => "-".to_string(),
    };
    let seller = summary.seller.as_deref().unwrap_or("-");
    let saved = summary
        .saved_at
        .as_deref()
        .map(format_relative)
        .unwrap_or_else(|| "-".to_string());
    format!("{title}  [{uid}]  {price}  by {seller}  saved {saved}")
}
