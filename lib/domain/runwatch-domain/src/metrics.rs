//! Summary metric derivations.
//!
//! Both formulas round half to even when converting to integers.

/// Approximately 20 GiB.
pub const DEFAULT_MAX_MEMORY_BYTES: f64 = 21_473_734_656.0;

/// Arithmetic mean; `0.0` for an empty input.
pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Throughput relative to runtime, weighted by CPU load.
///
/// Returns `None` when `runtime` is not positive; the ratio is undefined there.
pub fn efficiency_score(rows_read: i64, rows_written: i64, runtime: i64, avg_cpu: f64) -> Option<i64> {
    if runtime <= 0 {
        return None;
    }
    let rows = (rows_read + rows_written) as f64;
    let result = rows / runtime as f64 * (1.0 + avg_cpu) * 10.0;
    Some(result.round_ties_even() as i64)
}

/// Percentage derived from the average memory reading against a fixed ceiling.
///
/// An average of zero (no readings) yields `0`, not `100`.
pub fn average_memory_percent(avg_memory: f64, max_memory: f64) -> i64 {
    if avg_memory > 0.0 && max_memory > 0.0 {
        let result = (max_memory - avg_memory) / max_memory * 100.0;
        result.round_ties_even() as i64
    } else {
        0
    }
}
