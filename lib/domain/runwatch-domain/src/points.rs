//! Observations delivered by the change feed, one shape per category.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::category::Category;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthReportType {
    Cpu,
    Memory,
    Other(String),
}

impl HealthReportType {
    pub fn from_report(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CPU" => HealthReportType::Cpu,
            "MEMORY" => HealthReportType::Memory,
            _ => HealthReportType::Other(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPoint {
    pub report_type: HealthReportType,
    pub value: f64,
    pub log_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub created: NaiveDateTime,
    pub message: String,
    pub level: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub date: NaiveDateTime,
    pub description: String,
    pub result: String,
    pub manager: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataPoint {
    Health(HealthPoint),
    Error(LogEntry),
    Reconciliation(ReconciliationRecord),
}

impl DataPoint {
    pub fn category(&self) -> Category {
        match self {
            DataPoint::Health(_) => Category::Health,
            DataPoint::Error(_) => Category::Error,
            DataPoint::Reconciliation(_) => Category::Reconciliation,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        match self {
            DataPoint::Health(point) => point.log_time,
            DataPoint::Error(entry) => entry.created,
            DataPoint::Reconciliation(record) => record.date,
        }
    }
}
