pub mod commands;
pub mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::crawler::collector::PersistencePolicy;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (the default location when no path is given)
    #[arg(long, global = true)]
    pub log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every pending product page once
    Run {
        /// Configuration profile to use instead of the default
        #[arg(short, long)]
        profile: Option<String>,

        /// Number of browser sessions to run in parallel
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Rows requested per backlog page
        #[arg(long)]
        page_size: Option<usize>,

        /// When records are written (streaming, batched)
        #[arg(long)]
        policy: Option<PersistencePolicy>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the pending backlog without processing it
    Pending {
        /// Configuration profile to use instead of the default
        #[arg(short, long)]
        profile: Option<String>,

        /// Number of items to print
        #[arg(short, long, default_value_t = 20)]
        show: usize,
    },

    /// Manage configuration profiles
    Config {
        /// Profile name to manage
        #[arg(required = false)]
        profile: Option<String>,

        /// List all available profiles
        #[arg(short, long)]
        list: bool,
    },
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run { profile, concurrency, page_size, policy, json } => {
            info!("Starting run with profile {}", profile.as_deref().unwrap_or("default"));
            commands::run(profile, concurrency, page_size, policy, json).await
        }
        Commands::Pending { profile, show } => commands::pending(profile, show).await,
        Commands::Config { profile, list } => {
            if list {
                info!("Listing all configuration profiles");
                commands::list_profiles()
            } else if let Some(profile_name) = profile {
                info!("Managing configuration profile: {}", profile_name);
                commands::manage_profile(profile_name)
            } else {
                info!("Showing current configuration");
                commands::show_config()
            }
        }
    }
}
