use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser::{NavigationSignals, SessionHost, WebDriverHost};
use crate::cli::config::{CrawlerConfig, CrawlerSettings};
use crate::crawler::backlog::BacklogFetcher;
use crate::crawler::collector::ResultCollector;
use crate::crawler::error::StoreError;
use crate::crawler::events::{RunEvent, RunObserver, TracingObserver};
use crate::crawler::navigation::{NavigationPolicy, Navigator};
use crate::crawler::pool::SessionPool;
use crate::crawler::summary::{RunSummary, SummaryCollector};
use crate::crawler::task::WorkItem;
use crate::extract::ExtractorRegistry;
use crate::storage::{BacklogStore, PostgresStore, ResultStore};

/// Runs one pass over the pending backlog: fetch, fan out to the session
/// pool, persist, summarize
pub struct CrawlerController {
    settings: CrawlerSettings,
    fetcher: BacklogFetcher,
    results: Arc<dyn ResultStore>,
    pool: SessionPool,
    observer: Arc<dyn RunObserver>,
}

impl CrawlerController {
    pub fn new(
        settings: CrawlerSettings,
        backlog: Arc<dyn BacklogStore>,
        results: Arc<dyn ResultStore>,
        host: Arc<dyn SessionHost>,
        signals: Arc<NavigationSignals>,
        extractors: ExtractorRegistry,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        let navigator = Navigator::new(host.clone(), signals, NavigationPolicy::from(&settings));

        Self {
            fetcher: BacklogFetcher::new(backlog, settings.page_size),
            pool: SessionPool::new(host, navigator, Arc::new(extractors)),
            settings,
            results,
            observer,
        }
    }

    /// Connect to the configured database and WebDriver endpoint
    pub async fn connect(config: &CrawlerConfig) -> Result<Self> {
        let store = Arc::new(
            PostgresStore::connect(&config.storage)
                .await
                .context("Failed to connect to the database")?,
        );

        let signals = NavigationSignals::new();
        let host = Arc::new(WebDriverHost::new(config.browser.clone(), signals.clone()));
        let extractors = ExtractorRegistry::with_defaults();
        info!(
            "Using WebDriver at {} for sites {:?}",
            config.browser.webdriver_url,
            extractors.sites()
        );

        Ok(Self::new(
            config.crawler.clone(),
            store.clone(),
            store,
            host,
            signals,
            extractors,
            Arc::new(TracingObserver),
        ))
    }

    /// Every pending item, without processing anything
    pub async fn fetch_backlog(&self) -> Result<Vec<WorkItem>, StoreError> {
        self.fetcher.fetch_all_pending().await
    }

    /// Execute one run to completion.
    ///
    /// A failed backlog fetch ends the run before any session exists and is
    /// reported through the summary's terminal error. Item failures never
    /// stop the run.
    pub async fn execute_run(&self) -> RunSummary {
        let summary = Arc::new(SummaryCollector::new());
        let run_id = summary.run_id();

        let backlog = match self.fetcher.fetch_all_pending().await {
            Ok(backlog) => backlog,
            Err(e) => {
                warn!(%run_id, "Backlog fetch failed: {}", e);
                summary.abort(e.to_string());
                self.observer.notify(&RunEvent::Failed {
                    run_id,
                    error: e.to_string(),
                });
                return summary.finish();
            }
        };

        summary.set_backlog_size(backlog.len());
        if backlog.is_empty() {
            self.observer.notify(&RunEvent::Empty { run_id });
            return summary.finish();
        }

        self.observer.notify(&RunEvent::Started {
            run_id,
            backlog_size: backlog.len(),
            concurrency: self.settings.concurrency.max(1).min(backlog.len()),
        });

        let collector = Arc::new(ResultCollector::new(
            self.results.clone(),
            self.settings.persistence_policy,
            summary.clone(),
        ));

        self.pool
            .run(backlog, self.settings.concurrency, collector.clone(), summary.clone())
            .await;
        collector.finalize().await;

        let result = summary.finish();
        match &result.terminal_error {
            Some(error) => self.observer.notify(&RunEvent::Failed {
                run_id,
                error: error.clone(),
            }),
            None => self.observer.notify(&RunEvent::Completed { summary: result.clone() }),
        }
        result
    }
}
