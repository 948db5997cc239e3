use std::time::Duration;

use clap::Parser;

use runwatch::cli::Cli;
use runwatch::wiring;
use runwatch_adapter_sqlite::SqliteRunStore;
use runwatch_application::ManagerRun;
use runwatch_domain::{RunDescriptor, RunState, RunwatchConfig, parse_timestamp};

fn config_for(dir: &tempfile::TempDir) -> RunwatchConfig {
    let cli = Cli::parse_from([
        "runwatch-service",
        "--config",
        dir.path().join("absent.yaml").to_str().unwrap(),
        "--db",
        dir.path().join("runs.db").to_str().unwrap(),
    ]);
    let mut config = wiring::load_config(&cli).unwrap();
    config.watch.poll_interval_ms = 10;
    config.watch.stop_timeout_ms = 2_000;
    config.supervisor.discovery_interval_ms = 10;
    config
}

fn seed(config: &RunwatchConfig, sql: &str) {
    let store = SqliteRunStore::open(&config.store.sqlite_path, 1).unwrap();
    store.pool().get().unwrap().execute_batch(sql).unwrap();
}

#[tokio::test]
async fn test_run_lifecycle_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir);
    seed(
        &config,
        "INSERT INTO manager_tracking (id, mgr, execution_id, status, start_time) \
             VALUES (1, 'nightly-ledger', 501, 'Running', '2024-11-02 01:00:00.000');
         INSERT INTO logging_context (context_id, execution_id, context) VALUES (9, 501, 'ledger');
         INSERT INTO health_report (report_type, report_numeric_value, log_time) \
             VALUES ('CPU', 7.0, '2024-11-02 00:59:00.000');
         INSERT INTO health_report (report_type, report_numeric_value, log_time) \
             VALUES ('CPU', 1.0, '2024-11-02 01:00:05.000');",
    );

    let ports = wiring::sqlite_ports(&config).unwrap();
    let descriptor = RunDescriptor::new(
        1,
        "nightly-ledger",
        501,
        parse_timestamp("2024-11-02 01:00:00.000").unwrap(),
    );
    let mut run = ManagerRun::new(descriptor, &ports, &config);
    run.watch().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    seed(
        &config,
        "INSERT INTO health_report (report_type, report_numeric_value, log_time) \
             VALUES ('CPU', 3.0, '2024-11-02 01:00:10.000');
         INSERT INTO health_report (report_type, report_numeric_value, log_time) \
             VALUES ('MEMORY', 10000000000, '2024-11-02 01:00:10.000');
         INSERT INTO logging (context_id, created, log_message, log_level) \
             VALUES (9, '2024-11-02 01:00:11.000', 'rounding difference', 'WARN');
         INSERT INTO reconciliation (reconciled_at, description, result, manager) \
             VALUES ('2024-11-02 01:00:12.000', 'balances', 'OK', 'nightly-ledger');
         UPDATE manager_tracking SET status = 'Completed', runtime = 100, rows_read = 500, \
             rows_written = 300, end_time = '2024-11-02 01:01:40.000' WHERE id = 1;",
    );

    let summary = run.finish().await.unwrap().clone();
    assert_eq!(run.state(), RunState::Summarized);
    assert_eq!(summary.status(), Some("Completed"));
    assert_eq!(summary.health_points, 3);
    assert_eq!(summary.avg_cpu, 2.0);
    assert_eq!(summary.efficiency_score, Some(240));
    assert_eq!(summary.avg_memory_percent, 53);
    assert_eq!(summary.error_entries, 1);
    assert_eq!(summary.reconciliation_records, 1);
    assert_eq!(
        summary.end_time,
        Some(parse_timestamp("2024-11-02 01:01:40.000").unwrap())
    );
}

#[tokio::test]
async fn test_supervisor_discovers_and_finishes_runs() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir);
    seed(
        &config,
        "INSERT INTO manager_tracking (id, mgr, execution_id, status, start_time) \
             VALUES (4, 'customer-export', 404, 'Running', '2024-11-02 02:00:00.000');",
    );

    let mut supervisor = wiring::supervisor(&config).unwrap();
    assert!(supervisor.tick().await.unwrap().is_empty());
    assert_eq!(supervisor.active_runs().count(), 1);

    seed(
        &config,
        "UPDATE manager_tracking SET status = 'Failed', runtime = 0, end_time = '2024-11-02 02:00:30.000' \
         WHERE id = 4;",
    );
    let summaries = supervisor.tick().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].status(), Some("Failed"));
    assert_eq!(summaries[0].efficiency_score, None);
    assert_eq!(supervisor.active_runs().count(), 0);
}
