use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fab-cli", version, about = "Fab Bridge CLI utilities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the bridge server and print its clock
    Ping(commands::ping::PingArgs),
    /// Show service health and store totals
    Status(commands::status::StatusArgs),
    /// List captured entitlements
    List(commands::list::ListArgs),
    /// Follow store events live (SSE, or polling with --poll)
    Watch(commands::watch::WatchArgs),
    /// Export all captured entitlements to a JSON document
    Export(commands::export::ExportArgs),
    /// Clear the entitlement store
    Clear(commands::clear::ClearArgs),
    /// Diagnostic log helpers
    Logs {
        #[command(subcommand)]
        cmd: commands::logs::LogsCmd,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Ping(args) => commands::ping::run(&args),
        Commands::Status(args) => commands::status::run(&args),
        Commands::List(args) => commands::list::run(&args),
        Commands::Watch(args) => commands::watch::run(&args),
        Commands::Export(args) => commands::export::run(&args),
        Commands::Clear(args) => commands::clear::run(&args),
        Commands::Logs { cmd } => commands::logs::run(&cmd),
    };
    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
