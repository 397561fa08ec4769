//! Timestamp and calendar-date helpers for tracker values.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parse a tracker timestamp into UTC.
///
/// Accepts RFC 3339, the tracker's `2024-03-01T10:00:00.000+0700` form (with
/// or without fractional seconds), and offset-less values, which are read in
/// `local`.
pub fn parse_timestamp(raw: &str, local: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}

/// Parse a calendar date: `YYYY-MM-DD`, or the date part of a timestamp.
pub fn parse_date(raw: &str, local: FixedOffset) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    parse_timestamp(raw, local).map(|dt| dt.with_timezone(&local).date_naive())
}

/// Release date embedded in a fix-version name as the first run of exactly
/// eight digits read as `YYYYMMDD`, e.g. `release_20240305_hotfix`.
pub fn release_date_from_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 8 {
            if let Ok(date) = NaiveDate::parse_from_str(&name[start..i], "%Y%m%d") {
                return Some(date);
            }
        }
    }
    None
}

/// The calendar day `now` falls on in `local`.
pub fn local_today(now: DateTime<Utc>, local: FixedOffset) -> NaiveDate {
    now.with_timezone(&local).date_naive()
}
