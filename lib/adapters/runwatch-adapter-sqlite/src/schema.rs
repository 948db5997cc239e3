use anyhow::{Context, Result};
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS manager_tracking (
    id INTEGER PRIMARY KEY,
    mgr TEXT NOT NULL,
    execution_id INTEGER NOT NULL,
    status TEXT,
    runtime INTEGER,
    rows_read INTEGER,
    rows_written INTEGER,
    start_time TEXT NOT NULL,
    end_time TEXT
);

CREATE TABLE IF NOT EXISTS health_report (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_type TEXT NOT NULL,
    report_numeric_value REAL NOT NULL,
    log_time TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_health_report_log_time ON health_report(log_time);

CREATE TABLE IF NOT EXISTS logging_context (
    context_id INTEGER PRIMARY KEY,
    execution_id INTEGER NOT NULL,
    context TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS logging (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    context_id INTEGER NOT NULL REFERENCES logging_context(context_id),
    created TEXT NOT NULL,
    log_message TEXT NOT NULL,
    log_level TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logging_created ON logging(created);

CREATE TABLE IF NOT EXISTS reconciliation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reconciled_at TEXT NOT NULL,
    description TEXT NOT NULL,
    result TEXT NOT NULL,
    manager TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reconciliation_reconciled_at ON reconciliation(reconciled_at);
";

/// Creates the tracking and category tables if they do not exist yet.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("failed to bootstrap runwatch schema")
}
