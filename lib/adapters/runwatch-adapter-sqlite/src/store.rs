use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::warn;

use runwatch_domain::{RunDescriptor, RunId, TerminalStatus, parse_timestamp};
use runwatch_ports::RunStorePort;

use crate::rows::timestamp_at;
use crate::schema;

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TERMINAL_STATUS_SQL: &str =
    "SELECT status, runtime, rows_read, rows_written FROM manager_tracking WHERE id = ?1";
const END_TIME_SQL: &str = "SELECT end_time FROM manager_tracking WHERE id = ?1";
const RUNNING_SQL: &str = "SELECT id, mgr, execution_id, start_time FROM manager_tracking \
     WHERE end_time IS NULL ORDER BY id";

/// Run tracking reads over a pooled SQLite database.
///
/// Every read is an independent point-in-time query on a pooled connection.
#[derive(Clone)]
pub struct SqliteRunStore {
    pool: SqlitePool,
}

impl SqliteRunStore {
    pub fn open(path: &Path, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(BUSY_TIMEOUT));
        let pool = r2d2::Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .with_context(|| format!("failed to open sqlite pool at {}", path.display()))?;
        let conn = pool.get().context("failed to acquire sqlite connection")?;
        schema::bootstrap(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().context("failed to acquire sqlite connection")?;
            f(&conn)
        })
        .await
        .context("sqlite task panicked")?
    }
}

#[async_trait]
impl RunStorePort for SqliteRunStore {
    async fn terminal_status(&self, run_id: RunId) -> Result<Option<TerminalStatus>> {
        self.with_conn(move |conn| {
            conn.query_row(TERMINAL_STATUS_SQL, params![run_id], |row| {
                Ok(TerminalStatus {
                    status: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    runtime: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    rows_read: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    rows_written: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })
            .optional()
            .context("terminal status query failed")
        })
        .await
    }

    async fn end_time(&self, run_id: RunId) -> Result<Option<NaiveDateTime>> {
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(END_TIME_SQL, params![run_id], |row| {
                    row.get::<_, Option<String>>(0)
                })
                .optional()
                .context("end time query failed")?
                .flatten();
            match raw {
                Some(raw) => Ok(Some(parse_timestamp(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn running_runs(&self) -> Result<Vec<RunDescriptor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(RUNNING_SQL)?;
            let mut rows = stmt.query([]).context("running runs query failed")?;
            let mut running = Vec::new();
            while let Some(row) = rows.next()? {
                match descriptor_from(row) {
                    Ok(descriptor) => running.push(descriptor),
                    Err(err) => warn!("skipping unreadable run row: {err}"),
                }
            }
            Ok(running)
        })
        .await
    }
}

fn descriptor_from(row: &Row<'_>) -> rusqlite::Result<RunDescriptor> {
    Ok(RunDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        execution_id: row.get(2)?,
        start_time: timestamp_at(row, 3)?,
    })
}
