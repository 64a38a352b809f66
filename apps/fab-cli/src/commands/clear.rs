use anyhow::{bail, Result};
use clap::Args;

use fab_protocol::{Command, Reply};

use super::util::{confirm, send_command};

#[derive(Args)]
pub struct ClearArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

pub fn run(args: &ClearArgs) -> Result<()> {
    if !args.yes && !confirm("Clear all captured entitlements?")? {
        println!("aborted");
        return Ok(());
    }
    match send_command(&args.base, args.timeout, &Command::ClearEntitlements)? {
        Reply::Ack { .. } => {
            println!("store cleared");
            Ok(())
        }
        Reply::Err { error, .. } => bail!("server refused: {error}"),
        other => bail!("unexpected reply {other:?}"),
    }
}
