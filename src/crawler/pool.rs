use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::browser::host::{SessionHost, SessionLease};
use crate::crawler::collector::ResultCollector;
use crate::crawler::error::ExtractionError;
use crate::crawler::navigation::Navigator;
use crate::crawler::summary::SummaryCollector;
use crate::crawler::task::{FailureReason, ItemOutcome, ItemReport, WorkItem};
use crate::extract::ExtractorRegistry;

/// Hands out backlog positions, each exactly once
#[derive(Debug)]
pub struct Cursor {
    next: AtomicUsize,
    len: usize,
}

impl Cursor {
    pub fn new(len: usize) -> Self {
        Self {
            next: AtomicUsize::new(0),
            len,
        }
    }

    /// Claim the next unclaimed position, or `None` once the backlog is exhausted
    pub fn claim(&self) -> Option<usize> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        (index < self.len).then_some(index)
    }
}

/// How a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// The cursor ran out
    Drained,
    /// The worker could not create its session
    NoSession,
}

/// Runs a fixed number of workers over a backlog, one session per worker
#[derive(Clone)]
pub struct SessionPool {
    host: Arc<dyn SessionHost>,
    navigator: Navigator,
    extractors: Arc<ExtractorRegistry>,
}

impl SessionPool {
    pub fn new(host: Arc<dyn SessionHost>, navigator: Navigator, extractors: Arc<ExtractorRegistry>) -> Self {
        Self {
            host,
            navigator,
            extractors,
        }
    }

    /// Process the backlog with up to `concurrency` workers and wait for all
    /// of them to finish
    pub async fn run(
        &self,
        backlog: Vec<WorkItem>,
        concurrency: usize,
        collector: Arc<ResultCollector>,
        summary: Arc<SummaryCollector>,
    ) {
        let workers = concurrency.max(1).min(backlog.len());
        let cursor = Arc::new(Cursor::new(backlog.len()));
        // A backlog of unsupported targets only is drained without sessions
        let needs_session = backlog.iter().any(|item| self.extractors.resolve(&item.target).is_ok());
        let backlog = Arc::new(backlog);

        info!(
            "Starting {} worker(s) for {} item(s), navigation budget {:?} per item",
            workers,
            backlog.len(),
            self.navigator.policy().worst_case()
        );

        let mut set = JoinSet::new();
        for index in 0..workers {
            let pool = self.clone();
            let backlog = backlog.clone();
            let cursor = cursor.clone();
            let collector = collector.clone();
            let summary = summary.clone();

            set.spawn(async move {
                pool.worker(index, needs_session, backlog, cursor, collector, summary).await
            });
        }

        let mut without_session = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(WorkerExit::Drained) => {}
                Ok(WorkerExit::NoSession) => without_session += 1,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        if workers > 0 && without_session == workers {
            summary.abort("no worker could create a session");
        }

        let leftover = self.navigator.listener_count();
        if leftover > 0 {
            warn!("{} navigation listener(s) still registered after the run", leftover);
        }
    }

    async fn worker(
        &self,
        index: usize,
        needs_session: bool,
        backlog: Arc<Vec<WorkItem>>,
        cursor: Arc<Cursor>,
        collector: Arc<ResultCollector>,
        summary: Arc<SummaryCollector>,
    ) -> WorkerExit {
        debug!("Worker {} started", index);

        // The session comes before the first claim so a host failure never
        // costs an item
        let lease = if needs_session {
            match SessionLease::acquire(self.host.clone()).await {
                Ok(lease) => Some(lease),
                Err(e) => {
                    error!("Worker {} could not create a session: {}", index, e);
                    return WorkerExit::NoSession;
                }
            }
        } else {
            None
        };

        while let Some(position) = cursor.claim() {
            let item = &backlog[position];
            summary.record_attempt();
            debug!("Worker {} processing item {} ({})", index, item.id, item.target);

            let report = self.process(item, lease.as_ref()).await;

            summary.record_report(&report);
            collector.record(item, report.outcome).await;
        }

        if let Some(lease) = lease {
            lease.release().await;
        }
        debug!("Worker {} finished", index);
        WorkerExit::Drained
    }

    /// Drive one claimed item. Unsupported targets fail before any session
    /// work is spent.
    async fn process(&self, item: &WorkItem, lease: Option<&SessionLease>) -> ItemReport {
        let extractor = match self.extractors.resolve(&item.target) {
            Ok(extractor) => extractor,
            Err(ExtractionError::UnsupportedDomain(domain)) => {
                return failure(FailureReason::UnsupportedDomain(domain));
            }
            Err(e) => return failure(FailureReason::Extraction(e)),
        };

        match lease {
            Some(lease) => self.navigator.process(lease.session(), item, extractor.as_ref()).await,
            None => failure(FailureReason::SessionUnavailable("worker holds no session".to_string())),
        }
    }
}

fn failure(reason: FailureReason) -> ItemReport {
    ItemReport::new(ItemOutcome::Failure(reason), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::collector::PersistencePolicy;
    use crate::testing::{foreign_item, item, policy, test_registry, MemoryResults, ScriptedHost};
    use std::collections::HashSet;

    fn pool(host: &Arc<ScriptedHost>) -> SessionPool {
        let navigator = Navigator::new(host.clone(), host.signals(), policy());
        SessionPool::new(host.clone(), navigator, Arc::new(test_registry()))
    }

    fn collector(results: &Arc<MemoryResults>, summary: &Arc<SummaryCollector>) -> Arc<ResultCollector> {
        Arc::new(ResultCollector::new(results.clone(), PersistencePolicy::Streaming, summary.clone()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cursor_claims_each_position_once() {
        for len in [0usize, 1, 7, 64] {
            let cursor = Arc::new(Cursor::new(len));
            let mut handles = Vec::new();
            for _ in 0..4 {
                let cursor = cursor.clone();
                handles.push(tokio::spawn(async move {
                    let mut claimed = Vec::new();
                    while let Some(i) = cursor.claim() {
                        claimed.push(i);
                        tokio::task::yield_now().await;
                    }
                    claimed
                }));
            }

            let mut all = Vec::new();
            for handle in handles {
                all.extend(handle.await.unwrap());
            }
            all.sort_unstable();
            assert_eq!(all, (0..len).collect::<Vec<_>>());
            assert_eq!(cursor.claim(), None);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_item_processed_exactly_once() {
        for len in 0..20i64 {
            for concurrency in 1..5usize {
                let host = ScriptedHost::new();
                let results = Arc::new(MemoryResults::new());
                let summary = Arc::new(SummaryCollector::new());
                let backlog: Vec<WorkItem> = (1..=len).map(item).collect();
                summary.set_backlog_size(backlog.len());

                pool(&host)
                    .run(backlog.clone(), concurrency, collector(&results, &summary), summary.clone())
                    .await;

                let stored: HashSet<i64> = results.records().iter().map(|r| r.work_item_id).collect();
                assert_eq!(stored.len(), len as usize);
                for work in &backlog {
                    assert_eq!(host.navigations_to(&work.target), 1);
                }

                let snapshot = summary.snapshot();
                assert_eq!(snapshot.attempted, len as usize);
                assert_eq!(snapshot.succeeded, len as usize);
                assert_eq!(snapshot.skipped, 0);

                tokio::task::yield_now().await;
                assert!(host.created() <= concurrency);
                assert_eq!(host.created(), host.destroyed());
                assert_eq!(host.signals().listener_count(), 0);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_items_never_create_a_session() {
        let host = ScriptedHost::new();
        let results = Arc::new(MemoryResults::new());
        let summary = Arc::new(SummaryCollector::new());
        let backlog = vec![foreign_item(1), foreign_item(2)];
        summary.set_backlog_size(2);

        pool(&host).run(backlog, 2, collector(&results, &summary), summary.clone()).await;

        let snapshot = summary.snapshot();
        assert_eq!(snapshot.attempted, 2);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(host.created(), 0);
        assert!(!snapshot.is_aborted());
        assert!(results.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_backlog_fails_unsupported_items_on_a_live_session() {
        let host = ScriptedHost::new();
        let results = Arc::new(MemoryResults::new());
        let summary = Arc::new(SummaryCollector::new());
        let backlog = vec![foreign_item(1), item(2), foreign_item(3)];
        summary.set_backlog_size(backlog.len());

        pool(&host).run(backlog, 1, collector(&results, &summary), summary.clone()).await;
        tokio::task::yield_now().await;

        let snapshot = summary.snapshot();
        assert_eq!(snapshot.succeeded, 1);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(host.navigations_to(&foreign_item(1).target), 0);
        assert_eq!(host.created(), 1);
        assert_eq!(host.destroyed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_failure_stops_only_that_worker() {
        let host = ScriptedHost::new();
        host.fail_creates(1);
        let results = Arc::new(MemoryResults::new());
        let summary = Arc::new(SummaryCollector::new());
        let backlog: Vec<WorkItem> = (1..=6).map(item).collect();
        summary.set_backlog_size(backlog.len());

        pool(&host).run(backlog, 2, collector(&results, &summary), summary.clone()).await;
        tokio::task::yield_now().await;

        let snapshot = summary.snapshot();
        assert_eq!(snapshot.attempted, 6);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.succeeded, 6);
        assert_eq!(results.records().len(), 6);
        assert_eq!(host.created(), 1);
        assert_eq!(host.destroyed(), 1);
        assert!(!snapshot.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclaimed_items_are_skipped_when_no_session_can_be_made() {
        let host = ScriptedHost::new();
        host.fail_creates(usize::MAX);
        let results = Arc::new(MemoryResults::new());
        let summary = Arc::new(SummaryCollector::new());
        let backlog: Vec<WorkItem> = (1..=5).map(item).collect();
        summary.set_backlog_size(backlog.len());

        pool(&host).run(backlog, 2, collector(&results, &summary), summary.clone()).await;

        let snapshot = summary.snapshot();
        assert_eq!(snapshot.attempted, 0);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(snapshot.skipped, 5);
        assert!(snapshot.is_aborted());
        assert_eq!(host.destroyed(), 0);
        assert!(results.records().is_empty());
    }
}
