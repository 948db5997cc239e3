//! Manager run monitor service wiring.

pub mod cli;
pub mod telemetry;
pub mod wiring;
