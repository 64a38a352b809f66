use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use fab_protocol::{export_filename_today, ExportDocument};

use super::util::fetch_entitlements;

#[derive(Args)]
pub struct ExportArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
    /// Output path (defaults to fab-entitlements-YYYY-MM-DD.json)
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Write the document to stdout instead of a file
    #[arg(long, conflicts_with = "out")]
    pub stdout: bool,
}

pub fn run(args: &ExportArgs) -> Result<()> {
    let records = fetch_entitlements(&args.base, args.timeout)?;
    let doc = ExportDocument::new(records);
    let rendered = serde_json::to_string_pretty(&doc).context("rendering export document")?;

    if args.stdout {
        println!("{rendered}");
        return Ok(());
    }

    let path = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(export_filename_today()));
    std::fs::write(&path, rendered.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    println!(
        "exported {} entitlement(s) to {}",
        doc.metadata.item_count,
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn export_writes_a_self_describing_document() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/commands");
            then.status(200)
                .json_body(json!({"ok": true, "data": [{"uid": "a"}, {"uid": "b"}]}));
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("export.json");
        let args = ExportArgs {
            base: server.base_url(),
            timeout: 5,
            out: Some(out.clone()),
            stdout: false,
        };
        run(&args).expect("export");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).expect("read"))
                .expect("parse");
        assert_eq!(written["metadata"]["itemCount"], 2);
        assert_eq!(written["metadata"]["source"], "fab-bridge");
        assert_eq!(written["entitlements"][0]["uid"], "a");
    }
}
