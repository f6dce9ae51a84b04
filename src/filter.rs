use chrono::{DateTime, Utc};

use crate::time_utils::{period_cutoff, resolve_timestamp_ms};
use crate::types::{Period, Record};

/// Keep records whose timestamp falls inside `period` ending at `now`.
///
/// `raw_timestamp` returns the record's timestamp as either chain seconds or
/// Unix milliseconds; the same heuristic as everywhere else decides which.
/// `all` returns the input untouched. Records whose timestamp cannot be
/// resolved are dropped. Order is preserved.
pub fn filter_by_period<T, F>(records: Vec<T>, period: Period, now: DateTime<Utc>, raw_timestamp: F) -> Vec<T>
where
    F: Fn(&T) -> i64,
{
    if period == Period::All {
        return records;
    }
    let cutoff_ms = period_cutoff(period, now).timestamp_millis();
    records
        .into_iter()
        .filter(|r| resolve_timestamp_ms(raw_timestamp(r)).is_some_and(|ms| ms >= cutoff_ms))
        .collect()
}

/// [`filter_by_period`] for normalized records.
pub fn filter_records<T: Record>(records: Vec<T>, period: Period, now: DateTime<Utc>) -> Vec<T> {
    filter_by_period(records, period, now, |r| r.timestamp().timestamp_millis())
}
