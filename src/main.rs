//! Markpad - markdown editor core with local auto-save
//!
//! Keeps markdown files in a local key-value store and auto-saves a live
//! editor buffer into it on a timer.

mod app;
mod core;

use std::path::PathBuf;

use app::MarkpadApp;
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::config::AppConfig;

#[derive(Parser)]
#[command(name = "markpad")]
#[command(about = "Markdown files with local auto-save", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Data directory override
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored files
    List,
    /// Create an empty file
    New {
        /// File name (generated when omitted)
        name: Option<String>,
    },
    /// Print a stored file
    Open { name: String },
    /// Rename a stored file
    Rename { old_name: String, new_name: String },
    /// Delete a stored file
    Delete { name: String },
    /// Auto-save a markdown draft until Ctrl-C
    Edit {
        /// Draft file acting as the editor buffer
        #[arg(value_name = "DRAFT")]
        draft: PathBuf,
        /// Stored file name to save under
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Import markdown files from a directory
    Import { dir: PathBuf },
    /// Export stored files to a directory
    Export { dir: PathBuf },
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        LevelFilter::DEBUG
    } else {
        level.parse().unwrap_or(LevelFilter::INFO)
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let (mut config, config_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    init_logging(&config.log_level, cli.verbose);
    if let Some(e) = config_error {
        tracing::warn!("Failed to load config, using defaults: {:#}", e);
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }

    let mut app = MarkpadApp::new(config, cli.config)?;
    match cli.command {
        Commands::List => app.list(),
        Commands::New { name } => app.create(name.as_deref())?,
        Commands::Open { name } => app.open(&name)?,
        Commands::Rename { old_name, new_name } => app.rename(&old_name, &new_name)?,
        Commands::Delete { name } => app.delete(&name)?,
        Commands::Edit { draft, name } => app.edit(&draft, name.as_deref()).await?,
        Commands::Import { dir } => app.import(&dir)?,
        Commands::Export { dir } => app.export(&dir)?,
    }
    Ok(())
}
