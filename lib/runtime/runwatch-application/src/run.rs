use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};

use runwatch_domain::{
    Event, EventBus, EventLevel, RunDescriptor, RunState, RunSummary, RunUpdate, RunwatchConfig,
    RunwatchError, UpdateKind,
};
use runwatch_ports::PortSet;

use crate::aggregator::{ErrorAggregator, HealthAggregator, ReconciliationAggregator};
use crate::run_data::RunData;
use crate::session::WatchSession;
use crate::summarizer::RunSummarizer;

/// One monitored manager run: its data, its watch session and its summary.
pub struct ManagerRun {
    descriptor: RunDescriptor,
    state: RunState,
    data: Arc<RunData>,
    session: WatchSession,
    summarizer: RunSummarizer,
    events: EventBus,
    summary: Option<RunSummary>,
}

impl ManagerRun {
    pub fn new(descriptor: RunDescriptor, ports: &PortSet, config: &RunwatchConfig) -> Self {
        let data = Arc::new(RunData::new(&descriptor));
        let session = WatchSession::new(
            descriptor.clone(),
            Arc::clone(&ports.feed),
            Arc::clone(&data),
            &config.watch,
        );
        let summarizer = RunSummarizer::new(Arc::clone(&ports.store), &config.summary);
        let mut events = EventBus::default();
        events.push(Event::new(
            EventLevel::Info,
            format!("Manager {} detected", descriptor.name),
        ));

        Self {
            descriptor,
            state: RunState::Created,
            data,
            session,
            summarizer,
            events,
            summary: None,
        }
    }

    pub fn descriptor(&self) -> &RunDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn health(&self) -> &HealthAggregator {
        &self.data.health
    }

    pub fn errors(&self) -> &ErrorAggregator {
        &self.data.errors
    }

    pub fn reconciliation(&self) -> &ReconciliationAggregator {
        &self.data.reconciliation
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<RunUpdate> {
        self.data.subscribe()
    }

    /// Starts watching all categories from the run's start time.
    pub async fn watch(&mut self) -> Result<()> {
        let next = self.state.transition(RunState::Watching)?;
        self.session.start().await?;
        self.state = next;

        info!(
            run = self.descriptor.id,
            name = %self.descriptor.name,
            execution_id = self.descriptor.execution_id,
            start_time = %self.descriptor.start_time,
            "manager started"
        );
        self.events.push(Event::new(
            EventLevel::Info,
            format!(
                "Manager {} started with execution id {}",
                self.descriptor.name, self.descriptor.execution_id
            ),
        ));
        self.data.publish(UpdateKind::Overview);
        Ok(())
    }

    /// Stops all watchers. The run is `Stopped` afterwards even if a watcher
    /// had to be abandoned; that failure is still returned.
    pub async fn stop(&mut self) -> Result<()> {
        let next = self.state.transition(RunState::Stopped)?;
        let result = self.session.stop().await;
        self.state = next;

        match &result {
            Ok(()) => self
                .events
                .push(Event::new(EventLevel::Info, "Listening stopped")),
            Err(err) => self.events.push(Event::new(
                EventLevel::Warn,
                format!("Listening stopped uncleanly: {err:#}"),
            )),
        }
        result
    }

    /// Performs the terminal reads and metric derivation. Only valid once, from `Stopped`.
    pub async fn summarize(&mut self) -> Result<&RunSummary> {
        let next = self.state.transition(RunState::Summarized)?;
        let summary = self
            .summarizer
            .summarize(&self.descriptor, &self.data)
            .await?;
        self.state = next;

        let level = if summary.terminal.is_some() {
            EventLevel::Info
        } else {
            EventLevel::Warn
        };
        self.events.push(Event::new(
            level,
            format!(
                "Manager {} finished with status {}",
                self.descriptor.name,
                summary.status().unwrap_or("unknown")
            ),
        ));
        self.data.publish(UpdateKind::Overview);
        Ok(&*self.summary.insert(summary))
    }

    /// Stop followed by summarize. An unclean stop is logged, not fatal.
    pub async fn finish(&mut self) -> Result<&RunSummary> {
        match self.state {
            RunState::Watching => {
                if let Err(err) = self.stop().await {
                    warn!(run = self.descriptor.id, "summarizing after unclean stop: {err:#}");
                }
            }
            RunState::Stopped => {}
            other => {
                return Err(RunwatchError::InvalidTransition {
                    from: other,
                    to: RunState::Stopped,
                }
                .into());
            }
        }
        self.summarize().await
    }
}
