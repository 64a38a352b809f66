use std::time::Instant;

use anyhow::{bail, Result};
use clap::Args;

use fab_protocol::{Command, Reply};

use super::util::send_command;

#[derive(Args)]
pub struct PingArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

pub fn run(args: &PingArgs) -> Result<()> {
    let started = Instant::now();
    match send_command(&args.base, args.timeout, &Command::Ping)? {
        Reply::Pong { timestamp, .. } => {
            println!(
                "ok: server time {timestamp} ms, round trip {} ms",
                started.elapsed().as_millis()
            );
            Ok(())
        }
        Reply::Err { error, .. } => bail!("server refused: {error}"),
        other => bail!("unexpected reply {other:?}"),
    }
}
