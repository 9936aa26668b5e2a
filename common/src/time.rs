// Time types used across the pipeline.
//
// Ledger close times are authoritative and come from the upstream payload,
// always UTC microseconds. System time is only used for logging, cache TTLs,
// provenance event timestamps and file naming, never to order rows.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Micros timestamps used to determine it using its type
pub type TimestampMicros = u64;

// Millis timestamps used to determine it using its type
pub type TimestampMillis = u64;

// Seconds timestamps used to determine it using its type
pub type TimestampSeconds = u64;

#[inline]
pub fn get_current_time() -> Duration {
    let start = SystemTime::now();

    start
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

// Return timestamp in milliseconds
pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}

// Return timestamp in microseconds
pub fn get_current_time_in_micros() -> TimestampMicros {
    get_current_time().as_micros() as TimestampMicros
}

// RFC3339 rendering for checkpoint files and provenance events
pub fn format_rfc3339(micros: TimestampMicros) -> String {
    let datetime: DateTime<Utc> = Utc
        .timestamp_micros(micros as i64)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    datetime.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_epoch() {
        assert_eq!(format_rfc3339(0), "1970-01-01T00:00:00.000000Z");
    }

    #[test]
    fn test_rfc3339_micros_precision() {
        // 2021-01-01T00:00:00.000001Z
        assert_eq!(format_rfc3339(1_609_459_200_000_001), "2021-01-01T00:00:00.000001Z");
    }
}
