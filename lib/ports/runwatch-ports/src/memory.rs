//! In-process port implementations for wiring tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::mpsc;

use runwatch_domain::{
    Category, DataPoint, RunDescriptor, RunId, RunwatchError, TerminalStatus, WatchQuery,
};

use crate::{ChangeFeedPort, RunStorePort, Subscription};

#[derive(Debug, Clone)]
struct StoredRun {
    descriptor: RunDescriptor,
    terminal: Option<TerminalStatus>,
    end_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<Mutex<HashMap<RunId, StoredRun>>>,
    terminal_reads: Arc<AtomicUsize>,
    end_time_reads: Arc<AtomicUsize>,
    failing_terminal_reads: Arc<AtomicUsize>,
}

impl InMemoryRunStore {
    pub fn insert_run(&self, descriptor: RunDescriptor) {
        if let Ok(mut guard) = self.runs.lock() {
            guard.insert(
                descriptor.id,
                StoredRun {
                    descriptor,
                    terminal: None,
                    end_time: None,
                },
            );
        }
    }

    pub fn set_terminal(&self, run_id: RunId, terminal: TerminalStatus) {
        if let Ok(mut guard) = self.runs.lock() {
            if let Some(run) = guard.get_mut(&run_id) {
                run.terminal = Some(terminal);
            }
        }
    }

    pub fn set_end_time(&self, run_id: RunId, end_time: NaiveDateTime) {
        if let Ok(mut guard) = self.runs.lock() {
            if let Some(run) = guard.get_mut(&run_id) {
                run.end_time = Some(end_time);
            }
        }
    }

    /// Makes the next `count` terminal status reads fail.
    pub fn fail_terminal_reads(&self, count: usize) {
        self.failing_terminal_reads.store(count, Ordering::SeqCst);
    }

    pub fn terminal_reads(&self) -> usize {
        self.terminal_reads.load(Ordering::SeqCst)
    }

    pub fn end_time_reads(&self) -> usize {
        self.end_time_reads.load(Ordering::SeqCst)
    }

    fn read<T>(&self, run_id: RunId, f: impl FnOnce(&StoredRun) -> Option<T>) -> Result<Option<T>> {
        let guard = self
            .runs
            .lock()
            .map_err(|_| RunwatchError::Store("run table lock poisoned".into()))?;
        Ok(guard.get(&run_id).and_then(f))
    }
}

#[async_trait]
impl RunStorePort for InMemoryRunStore {
    async fn terminal_status(&self, run_id: RunId) -> Result<Option<TerminalStatus>> {
        self.terminal_reads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_terminal_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RunwatchError::Store(format!("terminal status read for run {run_id} failed")).into());
        }
        self.read(run_id, |run| run.terminal.clone())
    }

    async fn end_time(&self, run_id: RunId) -> Result<Option<NaiveDateTime>> {
        self.end_time_reads.fetch_add(1, Ordering::SeqCst);
        self.read(run_id, |run| run.end_time)
    }

    async fn running_runs(&self) -> Result<Vec<RunDescriptor>> {
        let guard = self
            .runs
            .lock()
            .map_err(|_| RunwatchError::Store("run table lock poisoned".into()))?;
        let mut running: Vec<_> = guard
            .values()
            .filter(|run| run.end_time.is_none())
            .map(|run| run.descriptor.clone())
            .collect();
        running.sort_by_key(|descriptor| descriptor.id);
        Ok(running)
    }
}

struct FeedSink {
    id: u64,
    query: WatchQuery,
    sender: mpsc::Sender<DataPoint>,
}

#[derive(Default)]
struct FeedState {
    next_id: AtomicU64,
    sinks: Mutex<Vec<FeedSink>>,
    queries: Mutex<Vec<WatchQuery>>,
    stall_stop: AtomicBool,
    fail_subscribe: Mutex<Option<Category>>,
}

/// Change feed driven by explicit `emit` calls.
///
/// Like a table-level change feed, a point reaches every live subscription of
/// its category; `emit_for` narrows error points to one execution id.
#[derive(Clone, Default)]
pub struct ManualChangeFeed {
    state: Arc<FeedState>,
}

impl ManualChangeFeed {
    /// Delivers `point` to every subscriber of its category; `false` if none is listening.
    pub async fn emit(&self, point: DataPoint) -> bool {
        self.deliver(point, |_| true).await
    }

    /// Like `emit`, but only reaches subscriptions bound to `execution_id`
    /// or to no execution id at all.
    pub async fn emit_for(&self, execution_id: i64, point: DataPoint) -> bool {
        self.deliver(point, |query| {
            query.execution_id.is_none_or(|bound| bound == execution_id)
        })
        .await
    }

    async fn deliver(&self, point: DataPoint, accepts: impl Fn(&WatchQuery) -> bool) -> bool {
        let senders: Vec<_> = self
            .state
            .sinks
            .lock()
            .map(|guard| {
                guard
                    .iter()
                    .filter(|sink| sink.query.category == point.category() && accepts(&sink.query))
                    .map(|sink| sink.sender.clone())
                    .collect()
            })
            .unwrap_or_default();
        let mut delivered = false;
        for sender in senders {
            delivered |= sender.send(point.clone()).await.is_ok();
        }
        delivered
    }

    pub fn is_listening(&self, category: Category) -> bool {
        self.state
            .sinks
            .lock()
            .map(|guard| guard.iter().any(|sink| sink.query.category == category))
            .unwrap_or(false)
    }

    pub fn queries(&self) -> Vec<WatchQuery> {
        self.state
            .queries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Makes every subsequent `stop` hang, simulating an unresponsive transport.
    pub fn stall_stop(&self, stall: bool) {
        self.state.stall_stop.store(stall, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, category: Option<Category>) {
        if let Ok(mut guard) = self.state.fail_subscribe.lock() {
            *guard = category;
        }
    }
}

#[async_trait]
impl ChangeFeedPort for ManualChangeFeed {
    async fn subscribe(
        &self,
        query: WatchQuery,
        sink: mpsc::Sender<DataPoint>,
    ) -> Result<Box<dyn Subscription>> {
        let category = query.category;
        let failing = self
            .state
            .fail_subscribe
            .lock()
            .map(|guard| *guard == Some(category))
            .unwrap_or(false);
        if failing {
            return Err(anyhow!(RunwatchError::Transport(format!(
                "subscription to {category} refused"
            ))));
        }
        if let Ok(mut guard) = self.state.queries.lock() {
            guard.push(query.clone());
        }
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.state.sinks.lock() {
            guard.push(FeedSink {
                id,
                query,
                sender: sink,
            });
        }
        Ok(Box::new(ManualSubscription {
            id,
            category,
            state: Arc::clone(&self.state),
        }))
    }
}

struct ManualSubscription {
    id: u64,
    category: Category,
    state: Arc<FeedState>,
}

#[async_trait]
impl Subscription for ManualSubscription {
    fn category(&self) -> Category {
        self.category
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        if self.state.stall_stop.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Ok(mut guard) = self.state.sinks.lock() {
            guard.retain(|sink| sink.id != self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use runwatch_domain::{HealthPoint, HealthReportType, LogEntry};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_reports_absent_rows() {
        let store = InMemoryRunStore::default();
        assert_eq!(store.terminal_status(9).await.unwrap(), None);
        assert_eq!(store.end_time(9).await.unwrap(), None);
        assert_eq!(store.terminal_reads(), 1);
    }

    #[tokio::test]
    async fn test_failing_terminal_reads_recover() {
        let store = InMemoryRunStore::default();
        store.fail_terminal_reads(1);
        assert!(store.terminal_status(9).await.is_err());
        assert_eq!(store.terminal_status(9).await.unwrap(), None);
        assert_eq!(store.terminal_reads(), 2);
    }

    #[tokio::test]
    async fn test_running_runs_excludes_finished() {
        let store = InMemoryRunStore::default();
        store.insert_run(RunDescriptor::new(1, "a", 10, start()));
        store.insert_run(RunDescriptor::new(2, "b", 20, start()));
        store.set_end_time(1, start());

        let running = store.running_runs().await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, 2);
    }

    #[tokio::test]
    async fn test_feed_routes_by_category_until_stopped() {
        let feed = ManualChangeFeed::default();
        let (tx, mut rx) = mpsc::channel(4);
        let query = WatchQuery::for_category(Category::Health, start(), 1);
        let subscription = feed.subscribe(query, tx).await.unwrap();

        let point = DataPoint::Health(HealthPoint {
            report_type: HealthReportType::Cpu,
            value: 1.0,
            log_time: start(),
        });
        assert!(feed.emit(point.clone()).await);
        assert_eq!(rx.recv().await, Some(point.clone()));

        subscription.stop().await.unwrap();
        assert!(!feed.emit(point).await);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_subscriptions_keep_their_own_sinks() {
        let feed = ManualChangeFeed::default();
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);
        let first = feed
            .subscribe(WatchQuery::for_category(Category::Error, start(), 1), first_tx)
            .await
            .unwrap();
        let second = feed
            .subscribe(WatchQuery::for_category(Category::Error, start(), 2), second_tx)
            .await
            .unwrap();

        let entry = DataPoint::Error(LogEntry {
            created: start(),
            message: "deadlock".into(),
            level: "ERROR".into(),
            context: "loader".into(),
        });
        assert!(feed.emit_for(2, entry.clone()).await);
        assert_eq!(second_rx.recv().await, Some(entry.clone()));
        assert!(first_rx.try_recv().is_err());

        first.stop().await.unwrap();
        assert!(feed.is_listening(Category::Error));
        assert!(feed.emit(entry.clone()).await);
        assert_eq!(second_rx.recv().await, Some(entry));

        second.stop().await.unwrap();
        assert!(!feed.is_listening(Category::Error));
    }
}
