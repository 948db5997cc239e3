//! Parameterized watch queries for the change feed.
//!
//! Values never appear in the statement text; the lower bound and the
//! execution id are bound as positional parameters.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::RunwatchError;

/// `yyyy-MM-dd HH:mm:ss.fff`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Timestamps are compared through `julianday` and selected in one normalized
// layout, so rows stored with a `T` separator or extra fractional digits sort
// and bound the same way as the cursor.
const HEALTH_SELECT: &str = "SELECT report_type, report_numeric_value, \
     strftime('%Y-%m-%d %H:%M:%f', log_time) AS at \
     FROM health_report \
     WHERE report_type IN ('CPU', 'MEMORY') AND julianday(log_time) > julianday(?1) \
     ORDER BY at";

const ERROR_SELECT: &str = "SELECT DISTINCT strftime('%Y-%m-%d %H:%M:%f', logging.created) AS at, \
     logging.log_message, logging.log_level, logging_context.context \
     FROM logging \
     INNER JOIN logging_context ON logging.context_id = logging_context.context_id \
     WHERE julianday(logging.created) > julianday(?1) AND logging_context.execution_id = ?2 \
     ORDER BY at";

const RECONCILIATION_SELECT: &str = "SELECT strftime('%Y-%m-%d %H:%M:%f', reconciled_at) AS at, \
     description, result, manager \
     FROM reconciliation \
     WHERE julianday(reconciled_at) > julianday(?1) \
     ORDER BY at";

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Accepts stored timestamps with or without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, RunwatchError> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|err| RunwatchError::InvalidArgument(format!("bad timestamp {raw:?}: {err}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryParam {
    Text(String),
    Integer(i64),
}

/// One category's subscription: a fixed statement plus its bound predicate values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchQuery {
    pub category: Category,
    pub watermark: NaiveDateTime,
    pub execution_id: Option<i64>,
}

impl WatchQuery {
    pub fn for_category(category: Category, watermark: NaiveDateTime, execution_id: i64) -> Self {
        let execution_id = match category {
            Category::Error => Some(execution_id),
            Category::Health | Category::Reconciliation => None,
        };
        Self {
            category,
            watermark,
            execution_id,
        }
    }

    /// Builds a query from a category name, failing on names that map to no category.
    pub fn build(
        category_name: &str,
        watermark: NaiveDateTime,
        execution_id: i64,
    ) -> Result<Self, RunwatchError> {
        let category = category_name.parse::<Category>()?;
        Ok(Self::for_category(category, watermark, execution_id))
    }

    /// Column holding the row's normalized timestamp.
    pub fn timestamp_column(&self) -> usize {
        match self.category {
            Category::Health => 2,
            Category::Error | Category::Reconciliation => 0,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self.category {
            Category::Health => HEALTH_SELECT,
            Category::Error => ERROR_SELECT,
            Category::Reconciliation => RECONCILIATION_SELECT,
        }
    }

    pub fn params(&self) -> Vec<QueryParam> {
        self.params_after(self.watermark)
    }

    /// Parameters for a re-run that only observes rows after `lower_bound`.
    /// The bound never moves below the watermark.
    pub fn params_after(&self, lower_bound: NaiveDateTime) -> Vec<QueryParam> {
        let bound = lower_bound.max(self.watermark);
        let mut params = vec![QueryParam::Text(format_timestamp(&bound))];
        if let Some(execution_id) = self.execution_id {
            params.push(QueryParam::Integer(execution_id));
        }
        params
    }
}
