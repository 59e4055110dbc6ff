use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use std::path::{Path, PathBuf};
use std::fs;

/// Directive for this crate at the requested verbosity
fn crate_directive(verbose: bool) -> &'static str {
    if verbose {
        "product_crawler=debug"
    } else {
        "product_crawler=info"
    }
}

/// Build the filter from RUST_LOG when it is set, otherwise our crate level
/// with everything else at warn
fn build_filter(verbose: bool) -> Result<EnvFilter> {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref(), verbose)
}

fn filter_from(rust_log: Option<&str>, verbose: bool) -> Result<EnvFilter> {
    match rust_log.map(str::trim).filter(|directives| !directives.is_empty()) {
        Some(directives) => Ok(EnvFilter::try_new(directives)?),
        None => Ok(EnvFilter::default()
            .add_directive(crate_directive(verbose).parse()?)
            .add_directive("warn".parse()?)),
    }
}

/// Initialize the logging system
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = build_filter(verbose)?;

    let fmt_layer = fmt::layer()
        .with_target(true);

    // If a log file is specified, create a file logger as well
    if let Some(log_file) = log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = fs::File::create(log_file)?;
        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Create a default log file path
pub fn default_log_file() -> PathBuf {
    let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "product-crawler", "product-crawler") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from("./logs")
    };

    path.push("crawler.log");
    path
}
