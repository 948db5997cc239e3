use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use runwatch_domain::{
    RunDescriptor, RunSummary, SummaryConfig, average_memory_percent, efficiency_score,
};
use runwatch_ports::RunStorePort;

use crate::run_data::RunData;

/// Terminal reads plus metric derivation, performed once per run after watching stops.
#[derive(Clone)]
pub struct RunSummarizer {
    store: Arc<dyn RunStorePort>,
    max_memory: f64,
}

impl RunSummarizer {
    pub fn new(store: Arc<dyn RunStorePort>, config: &SummaryConfig) -> Self {
        Self {
            store,
            max_memory: config.max_memory_bytes,
        }
    }

    /// Reads terminal status, then end time, then derives the efficiency score
    /// and the memory percentage. Missing store rows leave their fields absent;
    /// derivation still runs on whatever is available.
    pub async fn summarize(&self, run: &RunDescriptor, data: &RunData) -> Result<RunSummary> {
        let terminal = self
            .store
            .terminal_status(run.id)
            .await
            .with_context(|| format!("terminal status read failed for run {}", run.id))?;
        if terminal.is_none() {
            warn!(run = run.id, name = %run.name, "no tracking row for run");
        }

        let end_time = self
            .store
            .end_time(run.id)
            .await
            .with_context(|| format!("end time read failed for run {}", run.id))?;
        if end_time.is_none() {
            warn!(run = run.id, name = %run.name, "no end time recorded for run");
        }

        let avg_cpu = data.health.average_cpu();
        let (rows_read, rows_written, runtime) = terminal
            .as_ref()
            .map(|terminal| (terminal.rows_read, terminal.rows_written, terminal.runtime))
            .unwrap_or_default();
        let score = efficiency_score(rows_read, rows_written, runtime, avg_cpu);
        if score.is_none() {
            warn!(run = run.id, runtime, "efficiency score undefined for non-positive runtime");
        }

        let avg_memory = data.health.average_memory();
        let memory_percent = average_memory_percent(avg_memory, self.max_memory);

        let summary = RunSummary {
            run: run.clone(),
            terminal,
            end_time,
            avg_cpu,
            cpu: avg_cpu.round_ties_even() as i64,
            avg_memory,
            efficiency_score: score,
            avg_memory_percent: memory_percent,
            health_points: data.health.len(),
            error_entries: data.errors.len(),
            reconciliation_records: data.reconciliation.len(),
        };
        info!(
            run = run.id,
            name = %run.name,
            status = summary.status().unwrap_or("unknown"),
            efficiency_score = ?summary.efficiency_score,
            avg_memory_percent = summary.avg_memory_percent,
            "run summarized"
        );
        Ok(summary)
    }
}
