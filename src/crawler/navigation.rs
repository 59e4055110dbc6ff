use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::browser::host::{Session, SessionHost};
use crate::browser::signals::{NavSignal, NavigationSignals};
use crate::cli::config::CrawlerSettings;
use crate::crawler::error::ExtractionError;
use crate::crawler::task::{ExtractedRecord, FailureReason, ItemOutcome, ItemReport, Product, WorkItem};
use crate::extract::{PageExtractor, RenderedPage};

/// How often the page is re-read while waiting for it to become extractable
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Timing limits for driving one item
#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
    pub extract_timeout: Duration,
}

impl From<&CrawlerSettings> for NavigationPolicy {
    fn from(settings: &CrawlerSettings) -> Self {
        Self {
            timeout: settings.nav_timeout(),
            retries: settings.nav_retries,
            retry_delay: settings.nav_retry_delay(),
            settle_delay: settings.settle_delay(),
            extract_timeout: settings.extract_timeout(),
        }
    }
}

impl NavigationPolicy {
    /// Longest a navigation can take before it is given up on
    pub fn worst_case(&self) -> Duration {
        self.timeout * (self.retries + 1) + self.retry_delay * self.retries
    }
}

/// Where a navigation stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Navigating { attempt: u32 },
    Loaded,
    NavError(String),
    TimedOut,
    NavFailed,
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavState::Idle => write!(f, "idle"),
            NavState::Navigating { attempt } => write!(f, "navigating (attempt {})", attempt),
            NavState::Loaded => write!(f, "loaded"),
            NavState::NavError(e) => write!(f, "error: {}", e),
            NavState::TimedOut => write!(f, "timed out"),
            NavState::NavFailed => write!(f, "failed"),
        }
    }
}

/// Result of driving a session to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The page loaded after `retries` retries
    Loaded { retries: u32 },
    /// The retry budget ran out
    Failed { attempts: u32, last_error: String },
}

/// Drives one session through navigate, wait, retry and extraction
#[derive(Clone)]
pub struct Navigator {
    host: Arc<dyn SessionHost>,
    signals: Arc<NavigationSignals>,
    policy: NavigationPolicy,
}

impl Navigator {
    pub fn new(host: Arc<dyn SessionHost>, signals: Arc<NavigationSignals>, policy: NavigationPolicy) -> Self {
        Self { host, signals, policy }
    }

    pub fn policy(&self) -> &NavigationPolicy {
        &self.policy
    }

    /// Navigation listeners currently waiting on a signal
    pub fn listener_count(&self) -> usize {
        self.signals.listener_count()
    }

    fn transition(&self, session: &Session, state: &mut NavState, next: NavState) {
        debug!(session = %session.id(), "{} -> {}", state, next);
        *state = next;
    }

    /// Run one navigation attempt: issue it, then take whichever of load,
    /// error or timeout arrives first. The listener is unregistered when the
    /// subscription goes out of scope, whatever the outcome.
    async fn attempt(&self, session: &Session, target: &Url) -> NavState {
        let mut subscription = self.signals.subscribe(session.id());

        if let Err(e) = self.host.navigate(session, target, subscription.ticket()).await {
            return NavState::NavError(e.to_string());
        }

        tokio::select! {
            signal = subscription.recv() => match signal {
                Some(NavSignal::Loaded) => NavState::Loaded,
                Some(NavSignal::Failed(message)) => NavState::NavError(message),
                None => NavState::NavError("navigation signal dropped".to_string()),
            },
            _ = sleep(self.policy.timeout) => NavState::TimedOut,
        }
    }

    /// Navigate `session` to `target`, retrying errors and timeouts after a
    /// flat delay until the retry budget is spent
    pub async fn navigate(&self, session: &Session, target: &Url) -> Navigation {
        let mut state = NavState::Idle;
        let mut attempt: u32 = 0;

        loop {
            self.transition(session, &mut state, NavState::Navigating { attempt });
            let outcome = self.attempt(session, target).await;
            self.transition(session, &mut state, outcome);

            let last_error = match &state {
                NavState::Loaded => return Navigation::Loaded { retries: attempt },
                NavState::TimedOut => format!("timed out after {:?}", self.policy.timeout),
                NavState::NavError(message) => message.clone(),
                _ => format!("unexpected state {}", state),
            };

            if attempt >= self.policy.retries {
                self.transition(session, &mut state, NavState::NavFailed);
                return Navigation::Failed {
                    attempts: attempt + 1,
                    last_error,
                };
            }

            debug!(
                session = %session.id(),
                "Retrying {} in {:?} ({} of {})",
                target, self.policy.retry_delay, attempt + 1, self.policy.retries
            );
            sleep(self.policy.retry_delay).await;
            attempt += 1;
        }
    }

    /// Re-read the page until the extractor considers it ready, then extract
    async fn read_when_ready(
        &self,
        session: &Session,
        target: &Url,
        extractor: &dyn PageExtractor,
    ) -> Result<Product, ExtractionError> {
        loop {
            let html = self.host.page_source(session).await?;
            let page = RenderedPage::new(target.clone(), html);
            if extractor.is_ready(&page)? {
                return extractor.extract(&page);
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Wait for the page to become extractable and extract it, bounded by
    /// the extraction timeout
    pub async fn extract(
        &self,
        session: &Session,
        target: &Url,
        extractor: &dyn PageExtractor,
    ) -> Result<Product, ExtractionError> {
        match timeout(self.policy.extract_timeout, self.read_when_ready(session, target, extractor)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::NoResponse(self.policy.extract_timeout)),
        }
    }

    /// Drive an item from navigation to a terminal outcome
    pub async fn process(&self, session: &Session, item: &WorkItem, extractor: &dyn PageExtractor) -> ItemReport {
        let retries = match self.navigate(session, &item.target).await {
            Navigation::Loaded { retries } => retries,
            Navigation::Failed { attempts, last_error } => {
                warn!(item_id = item.id, "Giving up on {} after {} attempt(s)", item.target, attempts);
                return ItemReport::new(
                    ItemOutcome::Failure(FailureReason::NavigationFailed { attempts, last_error }),
                    attempts - 1,
                );
            }
        };

        sleep(self.policy.settle_delay).await;

        let outcome = match self.extract(session, &item.target, extractor).await {
            Ok(product) => ItemOutcome::Success(ExtractedRecord::capture(item.id, product)),
            Err(e) => ItemOutcome::Failure(FailureReason::Extraction(e)),
        };

        ItemReport::new(outcome, retries)
    }
}
