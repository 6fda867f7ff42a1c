use time::OffsetDateTime;

/// Milliseconds since the Unix epoch according to the system clock.
pub fn now_millis() -> i64 {
    millis(OffsetDateTime::now_utc())
}

/// Milliseconds since the Unix epoch for `datetime`.
pub fn millis(datetime: OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos() / 1_000_000) as i64
}
