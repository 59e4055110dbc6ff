//! Shared fakes for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use url::Url;

use crate::browser::host::{Session, SessionHost, SessionId};
use crate::browser::signals::{NavSignal, NavTicket, NavigationSignals};
use crate::cli::config::CrawlerSettings;
use crate::crawler::collector::PersistencePolicy;
use crate::crawler::error::{ExtractionError, HostError, StoreError};
use crate::crawler::events::{RunEvent, RunObserver};
use crate::crawler::navigation::NavigationPolicy;
use crate::crawler::task::{ExtractedRecord, Product, WorkItem};
use crate::extract::{self, ExtractorRegistry, PageExtractor, RenderedPage, UrlPattern};
use crate::storage::{BacklogPage, BacklogStore, ResultStore};

const DEFAULT_LOAD: Duration = Duration::from_millis(100);

static ITEM_ID: UrlPattern = UrlPattern::new(r"/items/(\d+)");

/// Work item on the test shop
pub fn item(id: i64) -> WorkItem {
    WorkItem {
        id,
        target: Url::parse(&format!("https://shop.test/items/{}", id)).unwrap(),
        source_label: Some("test".to_string()),
    }
}

/// Work item on a domain no extractor handles
pub fn foreign_item(id: i64) -> WorkItem {
    WorkItem {
        id,
        target: Url::parse(&format!("https://elsewhere.test/items/{}", id)).unwrap(),
        source_label: None,
    }
}

pub fn settings() -> CrawlerSettings {
    CrawlerSettings {
        concurrency: 1,
        page_size: 2,
        nav_timeout_ms: 5_000,
        nav_retries: 3,
        nav_retry_delay_ms: 1_000,
        settle_delay_ms: 200,
        extract_timeout_ms: 10_000,
        persistence_policy: PersistencePolicy::Streaming,
    }
}

pub fn policy() -> NavigationPolicy {
    NavigationPolicy::from(&settings())
}

/// Extractor for the test shop
pub struct TestExtractor;

impl PageExtractor for TestExtractor {
    fn site(&self) -> &'static str {
        "test"
    }

    fn domains(&self) -> &[&'static str] {
        &["shop.test"]
    }

    fn ready_selector(&self) -> &'static str {
        ".ready"
    }

    fn extract(&self, page: &RenderedPage) -> Result<Product, ExtractionError> {
        let document = page.document();
        let title = extract::text_of(&document, "h1")?.ok_or(ExtractionError::MissingField("title"))?;

        Ok(Product {
            product_id: extract::product_id(&page.url, &ITEM_ID)?,
            title,
            price: 1000,
            ..Default::default()
        })
    }
}

pub fn test_registry() -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(TestExtractor));
    registry
}

/// Backlog held in memory, sorted by id, that remembers the pages requested
pub struct VecBacklog {
    items: Vec<WorkItem>,
    requests: Mutex<Vec<(usize, usize)>>,
}

impl VecBacklog {
    pub fn new(mut items: Vec<WorkItem>) -> Self {
        items.sort_by_key(|item| item.id);
        Self {
            items,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<(usize, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BacklogStore for VecBacklog {
    async fn page(&self, offset: usize, limit: usize) -> Result<BacklogPage, StoreError> {
        self.requests.lock().unwrap().push((offset, limit));
        let items: Vec<WorkItem> = self.items.iter().skip(offset).take(limit).cloned().collect();
        Ok(items.into())
    }
}

/// Result store held in memory
#[derive(Default)]
pub struct MemoryResults {
    records: Mutex<Vec<ExtractedRecord>>,
    batches: AtomicUsize,
}

impl MemoryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExtractedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultStore for MemoryResults {
    async fn insert(&self, record: &ExtractedRecord) -> Result<(), StoreError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn insert_batch(&self, records: &[ExtractedRecord]) -> Result<(), StoreError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// Keeps every event it sees
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl RunObserver for RecordingObserver {
    fn notify(&self, event: &RunEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// What the host does with one navigation request
#[derive(Debug, Clone)]
pub enum Step {
    /// Report load-complete after the delay
    Load(Duration),
    /// Report an error after the delay
    Fail(Duration, &'static str),
    /// Never report anything
    Hang,
}

/// Session host that follows a per-URL script of navigation outcomes.
///
/// URLs without a script load after a short delay. Pages render as ready
/// immediately unless [`ScriptedHost::render_after`] says otherwise.
pub struct ScriptedHost {
    signals: Arc<NavigationSignals>,
    scripts: Mutex<HashMap<Url, VecDeque<Step>>>,
    render_delays: Mutex<HashMap<Url, Duration>>,
    current: Mutex<HashMap<SessionId, (Url, Instant)>>,
    navigations: Mutex<Vec<Url>>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    failing_creates: AtomicUsize,
    stale: Arc<AtomicUsize>,
}

impl ScriptedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            signals: NavigationSignals::new(),
            scripts: Mutex::new(HashMap::new()),
            render_delays: Mutex::new(HashMap::new()),
            current: Mutex::new(HashMap::new()),
            navigations: Mutex::new(Vec::new()),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            failing_creates: AtomicUsize::new(0),
            stale: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn signals(&self) -> Arc<NavigationSignals> {
        self.signals.clone()
    }

    pub fn script(&self, url: &Url, steps: Vec<Step>) {
        self.scripts.lock().unwrap().insert(url.clone(), steps.into());
    }

    /// The page at `url` only shows its content once `delay` has passed
    /// since the navigation started
    pub fn render_after(&self, url: &Url, delay: Duration) {
        self.render_delays.lock().unwrap().insert(url.clone(), delay);
    }

    /// The next `count` session creations fail
    pub fn fail_creates(&self, count: usize) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn navigations_to(&self, url: &Url) -> usize {
        self.navigations.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    /// Signals the hub refused because their attempt was already abandoned
    pub fn stale_signals(&self) -> usize {
        self.stale.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHost for ScriptedHost {
    async fn create_session(&self) -> Result<Session, HostError> {
        let failing = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HostError::Create("webdriver refused the session".to_string()));
        }

        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(SessionId::new()))
    }

    async fn navigate(&self, session: &Session, url: &Url, ticket: NavTicket) -> Result<(), HostError> {
        self.navigations.lock().unwrap().push(url.clone());
        self.current.lock().unwrap().insert(session.id(), (url.clone(), Instant::now()));

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Load(DEFAULT_LOAD));

        let signals = self.signals.clone();
        let stale = self.stale.clone();
        let report = move |signal: NavSignal| {
            if !signals.emit(ticket, signal) {
                stale.fetch_add(1, Ordering::SeqCst);
            }
        };

        match step {
            Step::Load(delay) => {
                tokio::spawn(async move {
                    sleep(delay).await;
                    report(NavSignal::Loaded);
                });
            }
            Step::Fail(delay, message) => {
                tokio::spawn(async move {
                    sleep(delay).await;
                    report(NavSignal::Failed(message.to_string()));
                });
            }
            Step::Hang => {}
        }

        Ok(())
    }

    async fn page_source(&self, session: &Session) -> Result<String, HostError> {
        let (url, started) = self
            .current
            .lock()
            .unwrap()
            .get(&session.id())
            .cloned()
            .ok_or_else(|| HostError::UnknownSession(session.id().to_string()))?;

        let delay = self.render_delays.lock().unwrap().get(&url).copied().unwrap_or_default();
        if started.elapsed() < delay {
            return Ok("<html><body><div class=\"spinner\"></div></body></html>".to_string());
        }

        Ok(format!(
            "<html><body><div class=\"ready\"><h1>Item at {}</h1></div></body></html>",
            url.path()
        ))
    }

    async fn destroy_session(&self, session: Session) {
        self.current.lock().unwrap().remove(&session.id());
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}
