use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use fab_protocol::{Command, DiagEntry, Reply};

use super::util::send_command;

#[derive(Subcommand)]
pub enum LogsCmd {
    /// Print recent diagnostic log entries
    Show(LogsShowArgs),
    /// Clear the diagnostic log
    Clear(LogsClearArgs),
}

#[derive(Args)]
pub struct LogsShowArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
    /// Show at most this many entries, newest last
    #[arg(long, default_value_t = 50)]
    pub limit: usize,
    /// Emit raw JSON instead of formatted lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct LogsClearArgs {
    /// Base URL of the bridge server (e.g., http://127.0.0.1:8787)
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub base: String,
    /// Timeout seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

pub fn run(cmd: &LogsCmd) -> Result<()> {
    match cmd {
        LogsCmd::Show(args) => show(args),
        LogsCmd::Clear(args) => clear(args),
    }
}

fn show(args: &LogsShowArgs) -> Result<()> {
    let logs = match send_command(&args.base, args.timeout, &Command::GetLogs)? {
        Reply::Logs { logs, .. } => logs,
        Reply::Err { error, .. } => bail!("server refused: {error}"),
        other => bail!("unexpected reply {other:?}"),
    };
    let tail_from = logs.len().saturating_sub(args.limit);
    let tail = &logs[tail_from..];

    if args.json {
        println!("{}", serde_json::to_string_pretty(tail)?);
        return Ok(());
    }
    if tail.is_empty() {
        println!("no log entries");
        return Ok(());
    }
    for entry in tail {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn clear(args: &LogsClearArgs) -> Result<()> {
    match send_command(&args.base, args.timeout, &Command::ClearLogs)? {
        Reply::Ack { .. } => {
            println!("log cleared");
            Ok(())
        }
        Reply::Err { error, .. } => bail!("server refused: {error}"),
        other => bail!("unexpected reply {other:?}"),
    }
}

fn format_entry(entry: &DiagEntry) -> String {
    let mut line = format!(
        "[{}] {:<5} {}",
        entry.timestamp,
        entry.level.to_uppercase(),
        entry.message
    );
    if let Some(data) = &entry.data {
        line.push(' ');
        line.push_str(&data.to_string());
    }
    line
}
