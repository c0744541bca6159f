use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, TimeZone, Utc};

/// Formats a moment into the on-disk timestamp shape: ISO-8601 UTC with
/// microsecond precision and an explicit `+00:00` offset. Existing databases
/// use this exact text, and range queries compare it lexicographically, so
/// every write must go through here.
pub fn to_iso(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn parse_iso(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|v| v.with_timezone(&Utc))
        .with_context(|| format!("Can't parse timestamp {value}"))
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}
