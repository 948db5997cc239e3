//! Run discovery: watches runs as they appear and summarizes them as they end.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;

use anyhow::{Context, Result};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use runwatch_domain::{RunId, RunSummary, RunwatchConfig};
use runwatch_ports::PortSet;

use crate::run::ManagerRun;

pub struct Supervisor {
    ports: PortSet,
    config: RunwatchConfig,
    runs: BTreeMap<RunId, ManagerRun>,
}

impl Supervisor {
    pub fn new(ports: PortSet, config: RunwatchConfig) -> Self {
        Self {
            ports,
            config,
            runs: BTreeMap::new(),
        }
    }

    pub fn active_runs(&self) -> impl Iterator<Item = &ManagerRun> {
        self.runs.values()
    }

    pub fn run(&self, id: RunId) -> Option<&ManagerRun> {
        self.runs.get(&id)
    }

    /// One discovery pass: finishes tracked runs that are no longer running,
    /// then starts watching newly running ones.
    pub async fn tick(&mut self) -> Result<Vec<RunSummary>> {
        let running = self
            .ports
            .store
            .running_runs()
            .await
            .context("run discovery failed")?;
        let running_ids: HashSet<RunId> = running.iter().map(|descriptor| descriptor.id).collect();

        let ended: Vec<RunId> = self
            .runs
            .keys()
            .filter(|id| !running_ids.contains(id))
            .copied()
            .collect();
        let mut summaries = Vec::new();
        for id in ended {
            if let Some(summary) = self.finish(id).await {
                summaries.push(summary);
            }
        }

        for descriptor in running {
            if self.runs.contains_key(&descriptor.id) {
                continue;
            }
            let id = descriptor.id;
            let mut run = ManagerRun::new(descriptor, &self.ports, &self.config);
            match run.watch().await {
                Ok(()) => {
                    self.runs.insert(id, run);
                }
                Err(err) => error!(run = id, "failed to start watching run: {err:#}"),
            }
        }

        Ok(summaries)
    }

    /// Ticks on the discovery interval until `shutdown` resolves, then
    /// finishes every run still being watched.
    pub async fn run_until<F>(mut self, shutdown: F) -> Vec<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.supervisor.discovery_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!("supervisor tick failed: {err:#}");
                    }
                }
            }
        }

        info!(active = self.runs.len(), "shutting down, finishing active runs");
        self.finish_all().await
    }

    pub async fn finish_all(&mut self) -> Vec<RunSummary> {
        let ids: Vec<RunId> = self.runs.keys().copied().collect();
        let mut summaries = Vec::new();
        for id in ids {
            if let Some(summary) = self.finish(id).await {
                summaries.push(summary);
            }
        }
        summaries
    }

    /// Finishes a tracked run. A run that fails to summarize stays tracked in
    /// `Stopped` so the next pass retries it; the store no longer lists it as
    /// running, so dropping it would lose its summary.
    async fn finish(&mut self, id: RunId) -> Option<RunSummary> {
        let mut run = self.runs.remove(&id)?;
        let outcome = run.finish().await.map(RunSummary::clone);
        match outcome {
            Ok(summary) => {
                match serde_json::to_string(&summary) {
                    Ok(json) => info!(run = id, summary = %json, "run finished"),
                    Err(err) => error!(run = id, "failed to encode summary: {err}"),
                }
                Some(summary)
            }
            Err(err) => {
                warn!(run = id, "failed to summarize run, retrying on the next pass: {err:#}");
                self.runs.insert(id, run);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use runwatch_domain::{Category, RunDescriptor, RunState, TerminalStatus};
    use runwatch_ports::{InMemoryRunStore, ManualChangeFeed};
    use std::sync::Arc;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 10, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn supervisor(store: &InMemoryRunStore, feed: &ManualChangeFeed) -> Supervisor {
        let ports = PortSet::new(Arc::new(store.clone()), Arc::new(feed.clone()));
        Supervisor::new(ports, RunwatchConfig::default())
    }

    #[tokio::test]
    async fn test_tick_watches_new_runs() {
        let store = InMemoryRunStore::default();
        let feed = ManualChangeFeed::default();
        store.insert_run(RunDescriptor::new(1, "alpha", 100, start()));
        let mut supervisor = supervisor(&store, &feed);

        let summaries = supervisor.tick().await.unwrap();
        assert!(summaries.is_empty());
        assert_eq!(supervisor.active_runs().count(), 1);
        assert_eq!(supervisor.run(1).map(ManagerRun::state), Some(RunState::Watching));
        assert!(feed.is_listening(Category::Reconciliation));

        supervisor.tick().await.unwrap();
        assert_eq!(feed.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_tick_summarizes_ended_runs() {
        let store = InMemoryRunStore::default();
        let feed = ManualChangeFeed::default();
        store.insert_run(RunDescriptor::new(7, "beta", 700, start()));
        let mut supervisor = supervisor(&store, &feed);
        supervisor.tick().await.unwrap();

        store.set_terminal(
            7,
            TerminalStatus {
                status: "Completed".into(),
                runtime: 100,
                rows_read: 500,
                rows_written: 300,
            },
        );
        store.set_end_time(7, start() + Duration::seconds(100));

        let summaries = supervisor.tick().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].run.id, 7);
        assert_eq!(summaries[0].efficiency_score, Some(80));
        assert_eq!(supervisor.active_runs().count(), 0);
        assert!(!feed.is_listening(Category::Health));
    }

    #[tokio::test]
    async fn test_failed_watch_is_not_tracked() {
        let store = InMemoryRunStore::default();
        let feed = ManualChangeFeed::default();
        feed.fail_subscribe(Some(Category::Error));
        store.insert_run(RunDescriptor::new(3, "gamma", 300, start()));
        let mut supervisor = supervisor(&store, &feed);

        supervisor.tick().await.unwrap();
        assert_eq!(supervisor.active_runs().count(), 0);

        feed.fail_subscribe(None);
        supervisor.tick().await.unwrap();
        assert_eq!(supervisor.active_runs().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_finishes_active_runs() {
        let store = InMemoryRunStore::default();
        let feed = ManualChangeFeed::default();
        store.insert_run(RunDescriptor::new(1, "alpha", 100, start()));
        store.insert_run(RunDescriptor::new(2, "delta", 200, start()));
        let supervisor = supervisor(&store, &feed);

        let summaries = supervisor
            .run_until(tokio::time::sleep(std::time::Duration::from_secs(5)))
            .await;
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|summary| summary.terminal.is_none()));
    }

    #[tokio::test]
    async fn test_failed_summary_is_retried() {
        let store = InMemoryRunStore::default();
        let feed = ManualChangeFeed::default();
        store.insert_run(RunDescriptor::new(4, "epsilon", 400, start()));
        let mut supervisor = supervisor(&store, &feed);
        supervisor.tick().await.unwrap();

        store.set_terminal(
            4,
            TerminalStatus {
                status: "Completed".into(),
                runtime: 100,
                rows_read: 500,
                rows_written: 300,
            },
        );
        store.set_end_time(4, start() + Duration::seconds(100));
        store.fail_terminal_reads(1);

        assert!(supervisor.tick().await.unwrap().is_empty());
        assert_eq!(supervisor.run(4).map(ManagerRun::state), Some(RunState::Stopped));
        assert!(!feed.is_listening(Category::Health));

        let summaries = supervisor.tick().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].status(), Some("Completed"));
        assert_eq!(summaries[0].efficiency_score, Some(80));
        assert_eq!(store.terminal_reads(), 2);
        assert_eq!(supervisor.active_runs().count(), 0);
    }
}
