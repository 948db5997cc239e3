use rusqlite::Row;
use rusqlite::types::{Type, Value};

use runwatch_domain::{
    Category, DataPoint, HealthPoint, HealthReportType, LogEntry, QueryParam,
    ReconciliationRecord, parse_timestamp,
};

pub(crate) fn bind_values(params: Vec<QueryParam>) -> Vec<Value> {
    params
        .into_iter()
        .map(|param| match param {
            QueryParam::Text(text) => Value::Text(text),
            QueryParam::Integer(value) => Value::Integer(value),
        })
        .collect()
}

pub(crate) fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

/// Maps one row of a category's watch statement, in its column order.
pub(crate) fn map_point(category: Category, row: &Row<'_>) -> rusqlite::Result<DataPoint> {
    Ok(match category {
        Category::Health => {
            let report_type: String = row.get(0)?;
            DataPoint::Health(HealthPoint {
                report_type: HealthReportType::from_report(&report_type),
                value: row.get(1)?,
                log_time: timestamp_at(row, 2)?,
            })
        }
        Category::Error => DataPoint::Error(LogEntry {
            created: timestamp_at(row, 0)?,
            message: row.get(1)?,
            level: row.get(2)?,
            context: row.get(3)?,
        }),
        Category::Reconciliation => DataPoint::Reconciliation(ReconciliationRecord {
            date: timestamp_at(row, 0)?,
            description: row.get(1)?,
            result: row.get(2)?,
            manager: row.get(3)?,
        }),
    })
}
