use anyhow::{Result, Context};
use tracing::{info, warn};
use crate::crawler::collector::PersistencePolicy;
use crate::crawler::{CrawlerController, RunSummary};
use crate::cli::config::CrawlerConfig;

/// Load the named profile (or the default) and check it
fn load_config(profile: Option<&str>) -> Result<CrawlerConfig> {
    let config = CrawlerConfig::load(profile)
        .context(format!("Failed to load profile: {}", profile.unwrap_or("default")))?;
    config.validate()?;
    Ok(config)
}

/// Execute one run over the pending backlog
pub async fn run(
    profile: Option<String>,
    concurrency: Option<usize>,
    page_size: Option<usize>,
    policy: Option<PersistencePolicy>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(profile.as_deref())?;

    // Override configuration with command line parameters if provided
    if let Some(c) = concurrency {
        config.crawler.concurrency = c;
    }
    if let Some(p) = page_size {
        config.crawler.page_size = p;
    }
    if let Some(p) = policy {
        config.crawler.persistence_policy = p;
    }
    config.validate()?;

    let controller = CrawlerController::connect(&config).await?;
    let summary = controller.execute_run().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if let Some(error) = summary.terminal_error {
        anyhow::bail!("Run {} aborted: {}", summary.run_id, error);
    }
    if summary.failed > 0 {
        if config.storage.skip_collected {
            warn!("{} item(s) failed; they stay pending for the next run", summary.failed);
        } else {
            warn!("{} item(s) failed", summary.failed);
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("Run ID: {}", summary.run_id);
    println!("Backlog: {}", summary.backlog_size);
    println!("Attempted: {}", summary.attempted);
    println!("Succeeded: {}", summary.succeeded);
    println!("Failed: {}", summary.failed);
    println!("Skipped: {}", summary.skipped);
    println!("Retries: {}", summary.retries);
    println!("Persisted: {}", summary.persisted);
    if summary.persistence_failures > 0 {
        println!("Persistence failures: {}", summary.persistence_failures);
    }
    println!("Started: {}", summary.started_at);
    if let Some(finished) = summary.finished_at {
        println!("Finished: {} ({}s)", finished, (finished - summary.started_at).num_seconds());
    }
}

/// Print the pending backlog
pub async fn pending(profile: Option<String>, show: usize) -> Result<()> {
    let config = load_config(profile.as_deref())?;
    let controller = CrawlerController::connect(&config).await?;

    let backlog = controller.fetch_backlog().await.context("Failed to fetch the backlog")?;

    println!("Pending items: {}", backlog.len());
    for item in backlog.iter().take(show) {
        match &item.source_label {
            Some(label) => println!("  {:>8}  {}  ({})", item.id, item.target, label),
            None => println!("  {:>8}  {}", item.id, item.target),
        }
    }
    if backlog.len() > show {
        println!("  ... and {} more", backlog.len() - show);
    }

    Ok(())
}

/// List all available configuration profiles
pub fn list_profiles() -> Result<()> {
    let profiles = CrawlerConfig::list_profiles()?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Manage a specific configuration profile
pub fn manage_profile(profile_name: String) -> Result<()> {
    // Load the profile if it exists
    match CrawlerConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Err(_) => {
            // Profile doesn't exist, create a new one
            warn!("Profile '{}' does not exist. Creating a default profile.", profile_name);
            let config = CrawlerConfig::default();
            config.save_as_profile(&profile_name)?;
            info!("Created default profile: {}", profile_name);
            println!("Created default profile: {}", profile_name);
        }
    }

    Ok(())
}

/// Show the current configuration
pub fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
    println!("Current configuration:");
    println!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}
