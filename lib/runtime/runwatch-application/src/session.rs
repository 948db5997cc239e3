//! Per-run set of change subscriptions, one per category.
//!
//! Each category gets its own channel: the transport pushes rows into the
//! sender, a drain task moves them into the run's aggregators. Stopping a
//! watcher stops the transport (which drops the sender) and then waits for the
//! drain task to empty the channel and exit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use runwatch_domain::{Category, DataPoint, RunDescriptor, RunwatchError, WatchConfig, WatchQuery};
use runwatch_ports::{ChangeFeedPort, Subscription};

use crate::run_data::RunData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Listening,
    Stopped,
}

struct Watcher {
    category: Category,
    subscription: Box<dyn Subscription>,
    drain: JoinHandle<usize>,
}

impl Watcher {
    async fn quiesce(self) -> Result<usize> {
        let category = self.category;
        self.subscription
            .stop()
            .await
            .with_context(|| format!("failed to stop {category} watcher"))?;
        self.drain
            .await
            .with_context(|| format!("{category} drain task failed"))
    }
}

pub struct WatchSession {
    id: Uuid,
    descriptor: RunDescriptor,
    feed: Arc<dyn ChangeFeedPort>,
    data: Arc<RunData>,
    channel_capacity: usize,
    stop_timeout: Duration,
    state: SessionState,
    watchers: Vec<Watcher>,
}

impl WatchSession {
    pub fn new(
        descriptor: RunDescriptor,
        feed: Arc<dyn ChangeFeedPort>,
        data: Arc<RunData>,
        config: &WatchConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor,
            feed,
            data,
            channel_capacity: config.channel_capacity.max(1),
            stop_timeout: config.stop_timeout(),
            state: SessionState::NotStarted,
            watchers: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Subscribes all three categories from the run's start time onward.
    ///
    /// A session starts at most once. If any subscription fails, the ones
    /// already started are stopped and the session ends up `Stopped`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::NotStarted {
            return Err(RunwatchError::AlreadyStarted.into());
        }

        for category in Category::ALL {
            let query = WatchQuery::for_category(
                category,
                self.descriptor.start_time,
                self.descriptor.execution_id,
            );
            if let Err(err) = self.start_watcher(query).await {
                warn!(session = %self.id, run = self.descriptor.id, %category, "watch start failed: {err:#}");
                self.state = SessionState::Listening;
                if let Err(stop_err) = self.stop().await {
                    warn!(session = %self.id, "cleanup after failed start: {stop_err:#}");
                }
                return Err(err);
            }
        }

        self.state = SessionState::Listening;
        info!(
            session = %self.id,
            run = self.descriptor.id,
            name = %self.descriptor.name,
            "listening for run data"
        );
        Ok(())
    }

    async fn start_watcher(&mut self, query: WatchQuery) -> Result<()> {
        let category = query.category;
        let (sink, rx) = mpsc::channel(self.channel_capacity);
        let drain = tokio::spawn(drain(rx, Arc::clone(&self.data)));
        let subscription = match self.feed.subscribe(query, sink).await {
            Ok(subscription) => subscription,
            Err(err) => {
                drain.abort();
                return Err(err.context(format!("failed to subscribe {category} watcher")));
            }
        };
        self.watchers.push(Watcher {
            category,
            subscription,
            drain,
        });
        Ok(())
    }

    /// Stops every watcher and waits until no further deliveries can happen.
    ///
    /// Calling it again is a no-op. The wait is bounded by the configured stop
    /// timeout; watchers still pending at the deadline are abandoned and the
    /// first failure is returned. The session is `Stopped` either way.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            SessionState::Stopped => return Ok(()),
            SessionState::NotStarted => {
                self.state = SessionState::Stopped;
                return Ok(());
            }
            SessionState::Listening => {}
        }
        self.state = SessionState::Stopped;

        let deadline = Instant::now() + self.stop_timeout;
        let mut first_error: Option<anyhow::Error> = None;
        for watcher in std::mem::take(&mut self.watchers) {
            let category = watcher.category;
            let abort = watcher.drain.abort_handle();
            match timeout_at(deadline, watcher.quiesce()).await {
                Ok(Ok(delivered)) => {
                    debug!(session = %self.id, %category, delivered, "watcher stopped");
                }
                Ok(Err(err)) => {
                    abort.abort();
                    warn!(session = %self.id, %category, "watcher stop failed: {err:#}");
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    abort.abort();
                    warn!(session = %self.id, %category, "watcher did not stop before the deadline");
                    first_error.get_or_insert(RunwatchError::StopTimeout { category }.into());
                }
            }
        }

        info!(session = %self.id, run = self.descriptor.id, "listening stopped");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn drain(mut rx: mpsc::Receiver<DataPoint>, data: Arc<RunData>) -> usize {
    let mut delivered = 0;
    while let Some(point) = rx.recv().await {
        data.ingest(point);
        delivered += 1;
    }
    delivered
}
