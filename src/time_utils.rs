//! Conversions between Ardor chain time, Unix time and period cutoffs.
//!
//! Ardor timestamps are whole seconds since [`ARDOR_EPOCH_MS`]. The EVM side
//! reports Unix milliseconds or RFC 3339 block timestamps. Raw values come from
//! upstream JSON, so every conversion is checked and out-of-range input yields
//! `None` instead of overflowing.

use chrono::{DateTime, TimeZone, Utc};

use crate::config::{ARDOR_EPOCH_MS, CHAIN_SECONDS_THRESHOLD};
use crate::types::Period;

pub fn ardor_epoch() -> DateTime<Utc> {
    ms_to_date(ARDOR_EPOCH_MS).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `epoch + ts` seconds.
pub fn chain_timestamp_to_date(ts: i64) -> Option<DateTime<Utc>> {
    ms_to_date(chain_seconds_to_ms(ts)?)
}

/// Inverse of [`chain_timestamp_to_date`], floored to whole seconds.
pub fn date_to_chain_timestamp(date: DateTime<Utc>) -> i64 {
    (date.timestamp_millis() - ARDOR_EPOCH_MS).div_euclid(1000)
}

/// Resolve a raw numeric timestamp to Unix milliseconds.
///
/// Values below `1e10` are chain-native seconds, everything else is already
/// Unix milliseconds. This misreads Unix *seconds* (they land in 2018+N years)
/// and millisecond values before April 1970; callers that know they hold Unix
/// seconds must convert them before calling this.
pub fn resolve_timestamp_ms(raw: i64) -> Option<i64> {
    if raw < CHAIN_SECONDS_THRESHOLD {
        chain_seconds_to_ms(raw)
    } else {
        Some(raw)
    }
}

pub fn resolve_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    ms_to_date(resolve_timestamp_ms(raw)?)
}

/// Parse a timestamp field from a raw upstream record: JSON numbers and
/// numeric strings go through the heuristic, other strings must be RFC 3339.
pub fn parse_timestamp_value(v: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(n) = v.as_i64() {
        return resolve_timestamp(n);
    }
    if let Some(f) = v.as_f64() {
        // `as` saturates, so anything outside i64 is rejected up front.
        if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
            return None;
        }
        return resolve_timestamp(f as i64);
    }
    let s = v.as_str()?.trim();
    if let Ok(n) = s.parse::<i64>() {
        return resolve_timestamp(n);
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Absolute cutoff for `period`; `all` maps to the chain epoch.
pub fn period_cutoff(period: Period, now: DateTime<Utc>) -> DateTime<Utc> {
    match period.duration() {
        Some(window) => now - window,
        None => ardor_epoch(),
    }
}

fn chain_seconds_to_ms(ts: i64) -> Option<i64> {
    ts.checked_mul(1000)?.checked_add(ARDOR_EPOCH_MS)
}

fn ms_to_date(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn epoch_is_2018_01_01() {
        assert_eq!(ardor_epoch(), at("2018-01-01T00:00:00Z"));
        assert_eq!(chain_timestamp_to_date(0), Some(at("2018-01-01T00:00:00Z")));
        assert_eq!(chain_timestamp_to_date(86_400), Some(at("2018-01-02T00:00:00Z")));
    }

    #[test]
    fn chain_timestamp_round_trips_to_the_second() {
        for s in [
            "2018-01-01T00:00:00Z",
            "2021-06-15T12:34:56Z",
            "2024-02-29T23:59:59Z",
        ] {
            let d = at(s);
            assert_eq!(chain_timestamp_to_date(date_to_chain_timestamp(d)), Some(d));
        }
        // Sub-second precision floors.
        let d = at("2023-03-03T03:03:03.999Z");
        assert_eq!(
            chain_timestamp_to_date(date_to_chain_timestamp(d)),
            Some(at("2023-03-03T03:03:03Z"))
        );
    }

    #[test]
    fn heuristic_classifies_chain_seconds_and_millis() {
        // 1_600_000 chain seconds ≈ 18.5 days after the epoch.
        assert_eq!(resolve_timestamp(1_600_000), Some(at("2018-01-19T12:26:40Z")));
        assert_eq!(resolve_timestamp(1_700_000_000_000), Some(at("2023-11-14T22:13:20Z")));
    }

    #[test]
    fn heuristic_edge_is_exact() {
        let just_below = CHAIN_SECONDS_THRESHOLD - 1;
        assert_eq!(resolve_timestamp_ms(just_below), Some(ARDOR_EPOCH_MS + just_below * 1000));
        assert_eq!(resolve_timestamp_ms(CHAIN_SECONDS_THRESHOLD), Some(CHAIN_SECONDS_THRESHOLD));
    }

    #[test]
    fn parses_numbers_numeric_strings_and_rfc3339() {
        assert_eq!(parse_timestamp_value(&json!(0)), Some(ardor_epoch()));
        assert_eq!(
            parse_timestamp_value(&json!("1700000000000")),
            Some(at("2023-11-14T22:13:20Z"))
        );
        assert_eq!(
            parse_timestamp_value(&json!("2024-05-01T10:00:00.000Z")),
            Some(at("2024-05-01T10:00:00Z"))
        );
        assert_eq!(parse_timestamp_value(&json!("yesterday")), None);
        assert_eq!(parse_timestamp_value(&json!(null)), None);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert_eq!(resolve_timestamp_ms(i64::MIN), None);
        assert_eq!(chain_timestamp_to_date(i64::MIN / 2), None);
        assert_eq!(parse_timestamp_value(&json!(-1.0e30)), None);
        assert_eq!(parse_timestamp_value(&json!(1.0e30)), None);
        assert_eq!(parse_timestamp_value(&json!(i64::MIN)), None);
        assert_eq!(parse_timestamp_value(&json!("-9223372036854775808")), None);
        // Still in range for chrono: one second before the chain epoch.
        assert_eq!(parse_timestamp_value(&json!(-1)), Some(at("2017-12-31T23:59:59Z")));
    }

    #[test]
    fn cutoffs_follow_period_lengths() {
        let now = at("2024-06-30T00:00:00Z");
        assert_eq!(period_cutoff(Period::Day, now), at("2024-06-29T00:00:00Z"));
        assert_eq!(period_cutoff(Period::Week, now), at("2024-06-23T00:00:00Z"));
        assert_eq!(period_cutoff(Period::Month, now), at("2024-05-31T00:00:00Z"));
        assert_eq!(period_cutoff(Period::All, now), ardor_epoch());
    }
}
