use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::RunwatchError;

pub type RunId = i64;

/// Identity of one manager run, fixed when the run is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub id: RunId,
    pub name: String,
    /// Correlation key for log entries.
    pub execution_id: i64,
    pub start_time: NaiveDateTime,
}

impl RunDescriptor {
    pub fn new(id: RunId, name: impl Into<String>, execution_id: i64, start_time: NaiveDateTime) -> Self {
        Self {
            id,
            name: name.into(),
            execution_id,
            start_time,
        }
    }
}

/// `Created -> Watching -> Stopped -> Summarized`, forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Created,
    Watching,
    Stopped,
    Summarized,
}

impl RunState {
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Created => Some(RunState::Watching),
            RunState::Watching => Some(RunState::Stopped),
            RunState::Stopped => Some(RunState::Summarized),
            RunState::Summarized => None,
        }
    }

    pub fn transition(self, to: RunState) -> Result<RunState, RunwatchError> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(RunwatchError::InvalidTransition { from: self, to })
        }
    }
}

/// Final recorded state read from the store after watching stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStatus {
    pub status: String,
    pub runtime: i64,
    pub rows_read: i64,
    pub rows_written: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: RunDescriptor,
    /// `None` when the store had no tracking row for the run.
    pub terminal: Option<TerminalStatus>,
    pub end_time: Option<NaiveDateTime>,
    pub avg_cpu: f64,
    pub cpu: i64,
    pub avg_memory: f64,
    /// `None` when the recorded runtime is zero or absent.
    pub efficiency_score: Option<i64>,
    pub avg_memory_percent: i64,
    pub health_points: usize,
    pub error_entries: usize,
    pub reconciliation_records: usize,
}

impl RunSummary {
    pub fn status(&self) -> Option<&str> {
        self.terminal.as_ref().map(|terminal| terminal.status.as_str())
    }
}
