//! Async seams between the run monitor and its store and transport.

pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::mpsc;

use runwatch_domain::{Category, DataPoint, RunDescriptor, RunId, TerminalStatus, WatchQuery};

pub use memory::{InMemoryRunStore, ManualChangeFeed};

/// Point-in-time reads against the run tracking store.
#[async_trait]
pub trait RunStorePort: Send + Sync {
    /// Status, runtime and row counters; `None` when no tracking row exists.
    async fn terminal_status(&self, run_id: RunId) -> Result<Option<TerminalStatus>>;

    async fn end_time(&self, run_id: RunId) -> Result<Option<NaiveDateTime>>;

    /// Runs that have started and not yet recorded an end time.
    async fn running_runs(&self) -> Result<Vec<RunDescriptor>>;
}

/// A live change subscription for one category.
#[async_trait]
pub trait Subscription: Send {
    fn category(&self) -> Category;

    /// Resolves once no further rows will be delivered and the sink has been dropped.
    async fn stop(self: Box<Self>) -> Result<()>;
}

/// Change-notification transport: delivers each changed row into `sink`.
#[async_trait]
pub trait ChangeFeedPort: Send + Sync {
    async fn subscribe(
        &self,
        query: WatchQuery,
        sink: mpsc::Sender<DataPoint>,
    ) -> Result<Box<dyn Subscription>>;
}

#[derive(Clone)]
pub struct PortSet {
    pub store: Arc<dyn RunStorePort>,
    pub feed: Arc<dyn ChangeFeedPort>,
}

impl PortSet {
    pub fn new(store: Arc<dyn RunStorePort>, feed: Arc<dyn ChangeFeedPort>) -> Self {
        Self { store, feed }
    }

    pub fn empty() -> Self {
        Self {
            store: Arc::new(NullRunStore),
            feed: Arc::new(NullChangeFeed),
        }
    }
}

#[derive(Clone, Default)]
struct NullRunStore;

#[async_trait]
impl RunStorePort for NullRunStore {
    async fn terminal_status(&self, _run_id: RunId) -> Result<Option<TerminalStatus>> {
        Ok(None)
    }

    async fn end_time(&self, _run_id: RunId) -> Result<Option<NaiveDateTime>> {
        Ok(None)
    }

    async fn running_runs(&self) -> Result<Vec<RunDescriptor>> {
        Ok(Vec::new())
    }
}

#[derive(Clone, Default)]
struct NullChangeFeed;

#[async_trait]
impl ChangeFeedPort for NullChangeFeed {
    async fn subscribe(
        &self,
        query: WatchQuery,
        _sink: mpsc::Sender<DataPoint>,
    ) -> Result<Box<dyn Subscription>> {
        Ok(Box::new(NullSubscription {
            category: query.category,
        }))
    }
}

struct NullSubscription {
    category: Category,
}

#[async_trait]
impl Subscription for NullSubscription {
    fn category(&self) -> Category {
        self.category
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
