//! Domain models and invariants for manager run monitoring.

pub mod category;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod points;
pub mod query;
pub mod run;

pub use category::Category;
pub use config::{RunwatchConfig, StoreConfig, SummaryConfig, SupervisorConfig, WatchConfig};
pub use error::RunwatchError;
pub use events::{Event, EventBus, EventLevel, RunUpdate, UpdateKind, now_millis};
pub use metrics::{DEFAULT_MAX_MEMORY_BYTES, average_memory_percent, efficiency_score, mean};
pub use points::{DataPoint, HealthPoint, HealthReportType, LogEntry, ReconciliationRecord};
pub use query::{QueryParam, TIMESTAMP_FORMAT, WatchQuery, format_timestamp, parse_timestamp};
pub use run::{RunDescriptor, RunId, RunState, RunSummary, TerminalStatus};
