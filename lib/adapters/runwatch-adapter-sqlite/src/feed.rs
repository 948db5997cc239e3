//! Change feed for SQLite, which has no server-side change notifications.
//!
//! Each subscription polls its category's statement on an interval and
//! delivers rows newer than the last one it delivered. The cursor starts at
//! the run's watermark, so nothing older is ever observed. Timestamps are
//! compared at millisecond precision whatever their stored layout; rows
//! sharing the cursor's millisecond that commit after it was read are not
//! seen, and rows whose timestamp SQLite cannot read are never selected.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::params_from_iter;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use runwatch_domain::{Category, DataPoint, RunwatchError, WatchQuery};
use runwatch_ports::{ChangeFeedPort, Subscription};

use crate::rows::{bind_values, map_point, timestamp_at};
use crate::store::SqlitePool;

#[derive(Clone)]
pub struct PollingChangeFeed {
    pool: SqlitePool,
    poll_interval: Duration,
}

impl PollingChangeFeed {
    pub fn new(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }
}

#[async_trait]
impl ChangeFeedPort for PollingChangeFeed {
    async fn subscribe(
        &self,
        query: WatchQuery,
        sink: mpsc::Sender<DataPoint>,
    ) -> Result<Box<dyn Subscription>> {
        let category = query.category;
        let pool = self.pool.clone();
        let sql = query.sql();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = pool.get()?;
            conn.prepare_cached(sql)?;
            Ok(())
        })
        .await
        .context("sqlite task panicked")?
        .map_err(|err| RunwatchError::Transport(format!("{category} statement rejected: {err:#}")))?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(poll_loop(
            self.pool.clone(),
            query,
            sink,
            self.poll_interval,
            shutdown_rx,
        ));
        debug!(%category, "polling subscription started");
        Ok(Box::new(PollingSubscription {
            category,
            shutdown,
            task,
        }))
    }
}

struct PollingSubscription {
    category: Category,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[async_trait]
impl Subscription for PollingSubscription {
    fn category(&self) -> Category {
        self.category
    }

    async fn stop(self: Box<Self>) -> Result<()> {
        let PollingSubscription {
            category,
            shutdown,
            task,
        } = *self;
        let _ = shutdown.send(());
        task.await
            .with_context(|| format!("{category} poller panicked"))
    }
}

async fn poll_loop(
    pool: SqlitePool,
    query: WatchQuery,
    sink: mpsc::Sender<DataPoint>,
    every: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let category = query.category;
    let mut cursor = query.watermark;
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                // Graceful stop gets one last poll; a dropped handle does not.
                if signal.is_ok() {
                    poll_once(&pool, &query, &sink, &mut cursor).await;
                }
                break;
            }
            _ = ticker.tick() => {
                if !poll_once(&pool, &query, &sink, &mut cursor).await {
                    break;
                }
            }
        }
    }
    debug!(%category, %cursor, "poller stopped");
}

/// Returns `false` once the sink is closed.
async fn poll_once(
    pool: &SqlitePool,
    query: &WatchQuery,
    sink: &mpsc::Sender<DataPoint>,
    cursor: &mut NaiveDateTime,
) -> bool {
    let rows = match fetch(pool.clone(), query.clone(), *cursor).await {
        Ok(rows) => rows,
        Err(err) => {
            warn!(category = %query.category, "poll failed: {err:#}");
            return true;
        }
    };
    for (at, point) in rows {
        *cursor = (*cursor).max(at);
        let Some(point) = point else { continue };
        if sink.send(point).await.is_err() {
            return false;
        }
    }
    true
}

type Fetched = Vec<(NaiveDateTime, Option<DataPoint>)>;

/// Rows after `cursor` with their normalized timestamps. A row whose columns
/// cannot be mapped is kept without a point so the cursor still moves past it.
async fn fetch(
    pool: SqlitePool,
    query: WatchQuery,
    cursor: NaiveDateTime,
) -> Result<Fetched> {
    tokio::task::spawn_blocking(move || -> Result<Fetched> {
        let category = query.category;
        let conn = pool.get().context("failed to acquire sqlite connection")?;
        let mut stmt = conn.prepare_cached(query.sql())?;
        let mut rows = stmt
            .query(params_from_iter(bind_values(query.params_after(cursor))))
            .with_context(|| format!("{category} poll query failed"))?;

        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            let at = match timestamp_at(row, query.timestamp_column()) {
                Ok(at) => at,
                Err(err) => {
                    warn!(%category, "skipping row without a usable timestamp: {err}");
                    continue;
                }
            };
            match map_point(category, row) {
                Ok(point) => fetched.push((at, Some(point))),
                Err(err) => {
                    warn!(%category, %at, "skipping unreadable row: {err}");
                    fetched.push((at, None));
                }
            }
        }
        Ok(fetched)
    })
    .await
    .context("sqlite task panicked")?
}
