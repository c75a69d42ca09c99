mod commands;
mod routes;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ical_relay_core::RelayConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ical-relay")]
#[command(about = "Relay iCalendar feeds through filter and action rules, and mail out changes")]
struct Cli {
    /// Config file (defaults to ~/.config/ical-relay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve profile feeds and the API, and run notifiers (default)
    Serve,
    /// Print a rendered profile
    Render {
        profile: String,

        /// Add a reminder this long before every event (e.g. "15M", "1H")
        #[arg(long)]
        reminder: Option<String>,
    },
    /// Run one notifier cycle
    Notify { id: String },
    /// Show what changed between two calendars
    Compare {
        /// Old calendar: a path or a source like https://... or profile://...
        old: String,
        /// New calendar
        new: String,
    },
    /// Show what a calendar contains
    Info { source: String },
    /// Print the events with one UID from a calendar
    Cherrypick {
        /// Calendar to pick from: a path or a source like https://...
        source: String,
        /// UID of the event
        id: String,
    },
    /// Print a calendar with the events of another one appended
    Add {
        /// Calendar whose events are added (- reads stdin)
        events: String,
        /// Calendar to add them to
        base: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref())?;
    init_logging(&config.server.log_level);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::run(config).await,
        Commands::Render { profile, reminder } => {
            commands::render::run(config, &profile, reminder.as_deref()).await
        }
        Commands::Notify { id } => commands::notify::run(config, &id).await,
        Commands::Compare { old, new } => commands::compare::run(config, &old, &new).await,
        Commands::Info { source } => commands::info::run(config, &source).await,
        Commands::Cherrypick { source, id } => {
            commands::cherrypick::run(config, &source, &id).await
        }
        Commands::Add { events, base } => commands::add::run(config, &events, &base).await,
    }
}

/// Log to stderr; `RUST_LOG` overrides the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
