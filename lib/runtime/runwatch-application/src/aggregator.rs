//! Append-only per-category accumulation with snapshot reads.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDateTime;

use runwatch_domain::{
    Category, HealthPoint, HealthReportType, LogEntry, ReconciliationRecord, mean,
};

pub trait Observation: Clone + Send + Sync + 'static {
    fn numeric_value(&self) -> Option<f64>;
    fn observed_at(&self) -> NaiveDateTime;
}

impl Observation for HealthPoint {
    fn numeric_value(&self) -> Option<f64> {
        Some(self.value)
    }

    fn observed_at(&self) -> NaiveDateTime {
        self.log_time
    }
}

impl Observation for LogEntry {
    fn numeric_value(&self) -> Option<f64> {
        None
    }

    fn observed_at(&self) -> NaiveDateTime {
        self.created
    }
}

impl Observation for ReconciliationRecord {
    fn numeric_value(&self) -> Option<f64> {
        None
    }

    fn observed_at(&self) -> NaiveDateTime {
        self.date
    }
}

/// Ordered, unbounded sequence of one category's observations for a run.
///
/// Points are kept in arrival order without deduplication. Readers see a
/// consistent prefix of everything ingested up to the read.
#[derive(Debug)]
pub struct CategoryAggregator<P> {
    category: Category,
    watermark: NaiveDateTime,
    points: RwLock<Vec<P>>,
}

pub type HealthAggregator = CategoryAggregator<HealthPoint>;
pub type ErrorAggregator = CategoryAggregator<LogEntry>;
pub type ReconciliationAggregator = CategoryAggregator<ReconciliationRecord>;

impl<P: Observation> CategoryAggregator<P> {
    pub fn new(category: Category, watermark: NaiveDateTime) -> Self {
        Self {
            category,
            watermark,
            points: RwLock::new(Vec::new()),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn watermark(&self) -> NaiveDateTime {
        self.watermark
    }

    pub fn ingest(&self, point: P) {
        if let Ok(mut guard) = self.points.write() {
            guard.push(point);
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<P> {
        self.points
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Mean of every numeric value ingested so far, `0.0` when there are none.
    pub fn average(&self) -> f64 {
        self.average_where(|_| true)
    }

    pub fn average_where(&self, filter: impl Fn(&P) -> bool) -> f64 {
        self.points
            .read()
            .map(|guard| {
                mean(
                    guard
                        .iter()
                        .filter(|point| filter(*point))
                        .filter_map(Observation::numeric_value),
                )
            })
            .unwrap_or(0.0)
    }

    pub fn last_where(&self, filter: impl Fn(&P) -> bool) -> Option<P> {
        self.points
            .read()
            .ok()
            .and_then(|guard| guard.iter().rev().find(|point| filter(*point)).cloned())
    }

    pub fn latest_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_where(|_| true).map(|point| point.observed_at())
    }
}

impl CategoryAggregator<HealthPoint> {
    pub fn average_cpu(&self) -> f64 {
        self.average_where(|point| point.report_type == HealthReportType::Cpu)
    }

    pub fn average_memory(&self) -> f64 {
        self.average_where(|point| point.report_type == HealthReportType::Memory)
    }

    pub fn current_cpu(&self) -> Option<f64> {
        self.last_where(|point| point.report_type == HealthReportType::Cpu)
            .map(|point| point.value)
    }

    pub fn current_memory(&self) -> Option<f64> {
        self.last_where(|point| point.report_type == HealthReportType::Memory)
            .map(|point| point.value)
    }
}

impl CategoryAggregator<LogEntry> {
    pub fn count_by_level(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.snapshot() {
            *counts.entry(entry.level).or_insert(0) += 1;
        }
        counts
    }
}

impl CategoryAggregator<ReconciliationRecord> {
    pub fn count_by_result(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.snapshot() {
            *counts.entry(record.result).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn health(report_type: HealthReportType, value: f64, offset: i64) -> HealthPoint {
        HealthPoint {
            report_type,
            value,
            log_time: start() + Duration::seconds(offset),
        }
    }

    fn log(level: &str, offset: i64) -> LogEntry {
        LogEntry {
            created: start() + Duration::seconds(offset),
            message: "row rejected".into(),
            level: level.into(),
            context: "loader".into(),
        }
    }

    #[test]
    fn test_empty_average_is_zero() {
        let aggregator = HealthAggregator::new(Category::Health, start());
        assert_eq!(aggregator.average(), 0.0);
        assert_eq!(aggregator.average_cpu(), 0.0);
        assert_eq!(aggregator.average_memory(), 0.0);
        assert!(aggregator.is_empty());
    }

    #[test]
    fn test_average_tracks_every_ingest() {
        let aggregator = HealthAggregator::new(Category::Health, start());
        aggregator.ingest(health(HealthReportType::Cpu, 1.0, 1));
        assert_eq!(aggregator.average_cpu(), 1.0);
        aggregator.ingest(health(HealthReportType::Cpu, 3.0, 2));
        assert_eq!(aggregator.average_cpu(), 2.0);
        aggregator.ingest(health(HealthReportType::Memory, 400.0, 3));
        assert_eq!(aggregator.average_cpu(), 2.0);
        assert_eq!(aggregator.average_memory(), 400.0);
        assert_eq!(aggregator.average(), 404.0 / 3.0);
    }

    #[test]
    fn test_current_values_are_latest() {
        let aggregator = HealthAggregator::new(Category::Health, start());
        aggregator.ingest(health(HealthReportType::Cpu, 5.0, 1));
        aggregator.ingest(health(HealthReportType::Memory, 10.0, 2));
        aggregator.ingest(health(HealthReportType::Cpu, 7.0, 3));
        assert_eq!(aggregator.current_cpu(), Some(7.0));
        assert_eq!(aggregator.current_memory(), Some(10.0));
        assert_eq!(
            aggregator.latest_timestamp(),
            Some(start() + Duration::seconds(3))
        );
    }

    #[test]
    fn test_duplicates_are_kept_in_order() {
        let aggregator = ErrorAggregator::new(Category::Error, start());
        aggregator.ingest(log("ERROR", 1));
        aggregator.ingest(log("ERROR", 1));
        aggregator.ingest(log("WARN", 2));

        assert_eq!(aggregator.len(), 3);
        assert_eq!(aggregator.average(), 0.0);
        let counts = aggregator.count_by_level();
        assert_eq!(counts.get("ERROR"), Some(&2));
        assert_eq!(counts.get("WARN"), Some(&1));
    }

    #[test]
    fn test_reconciliation_counts_by_result() {
        let aggregator = ReconciliationAggregator::new(Category::Reconciliation, start());
        for (offset, result) in ["OK", "MISMATCH", "OK"].iter().enumerate() {
            aggregator.ingest(ReconciliationRecord {
                date: start() + Duration::seconds(offset as i64),
                description: "ledger".into(),
                result: result.to_string(),
                manager: "nightly".into(),
            });
        }
        assert_eq!(aggregator.count_by_result().get("OK"), Some(&2));
        let dates: Vec<_> = aggregator.snapshot().iter().map(|r| r.date).collect();
        assert!(dates.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_concurrent_ingest_and_read() {
        let aggregator = Arc::new(HealthAggregator::new(Category::Health, start()));
        let writers: Vec<_> = (0..4)
            .map(|worker| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        aggregator.ingest(health(HealthReportType::Cpu, 2.0, worker * 1000 + i));
                        let average = aggregator.average_cpu();
                        assert!(average == 0.0 || average == 2.0);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(aggregator.len(), 1000);
        assert_eq!(aggregator.average_cpu(), 2.0);
    }
}
