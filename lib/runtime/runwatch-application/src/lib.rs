//! Run lifecycle: watching, aggregation and summarization.

pub mod aggregator;
pub mod run;
pub mod run_data;
pub mod session;
pub mod summarizer;
pub mod supervisor;

pub use aggregator::{
    CategoryAggregator, ErrorAggregator, HealthAggregator, Observation, ReconciliationAggregator,
};
pub use run::ManagerRun;
pub use run_data::RunData;
pub use session::{SessionState, WatchSession};
pub use summarizer::RunSummarizer;
pub use supervisor::Supervisor;
