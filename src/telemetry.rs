//! Tracing subscriber setup for the service binary.

use tracing_subscriber::EnvFilter;

/// Filter read from `RUNWATCH_LOG`, defaulting to `info`.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_env("RUNWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
