//! Outbox CLI
//!
//! Command-line tools for inspecting and draining a persisted mutation queue.
//!
//! # Commands
//!
//! - `enqueue` - Queue a mutation without sending it
//! - `list` - Show queued mutations
//! - `status` - Probe the backend and show sync status
//! - `drain` - Replay the queue once
//! - `watch` - Run the sync loop until Ctrl-C
//! - `clear` - Drop every queued mutation

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::{Context, Format};
use config::FileConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Offline mutation queue tools.
#[derive(Parser)]
#[command(name = "outbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the persisted queue
    #[arg(global = true, short, long, default_value = "./outbox-data")]
    data_dir: PathBuf,

    /// Backend base URL (overrides the config file)
    #[arg(global = true, short, long)]
    server: Option<String>,

    /// Storage key namespace (overrides the config file)
    #[arg(global = true, short, long)]
    namespace: Option<String>,

    /// JSON config file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a mutation without sending it
    Enqueue {
        /// Entity kind (creator, campaign, submission, payout)
        entity: String,

        /// Operation (create, update, delete)
        operation: String,

        /// JSON object payload
        payload: String,
    },

    /// Show queued mutations
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Probe the backend and show sync status
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Replay the queue once
    Drain {
        /// Drain even if the health probe fails
        #[arg(long)]
        force: bool,
    },

    /// Run the sync loop until Ctrl-C
    Watch,

    /// Drop every queued mutation
    Clear {
        /// Confirm the drop
        #[arg(short, long)]
        yes: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn context(&self) -> Result<Context, Box<dyn std::error::Error>> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let mut config = file.into_sync_config();
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(namespace) = &self.namespace {
            config = config.with_namespace(namespace.clone());
        }
        Ok(Context {
            data_dir: self.data_dir.clone(),
            config,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("Outbox CLI v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = cli.context()?;
    match &cli.command {
        Commands::Enqueue {
            entity,
            operation,
            payload,
        } => commands::enqueue::run(&ctx, entity, operation, payload)?,
        Commands::List { format } => commands::list::run(&ctx, *format)?,
        Commands::Status { format } => commands::status::run(&ctx, *format).await?,
        Commands::Drain { force } => commands::drain::run(&ctx, *force).await?,
        Commands::Watch => commands::watch::run(&ctx).await?,
        Commands::Clear { yes } => commands::clear::run(&ctx, *yes)?,
        Commands::Version => {}
    }

    Ok(())
}
