//! Date formatting for the counter and recent-IP keys.
//!
//! Every counter key in [`crate::metadata_store`] is scoped to "today" in the
//! form `YYYYMMDD`; the recent-IP list additionally wants a full
//! `YYYYMMDDHHMMSS` timestamp. Both are derived from the session's
//! [`crate::env::Environment::unix_time_secs`] so tests can pin the clock.

use time::OffsetDateTime;

/// Format `unix_secs` as `YYYYMMDD`.
#[must_use]
pub fn date_ymd(unix_secs: u64) -> String {
    let dt = offset_date_time(unix_secs);
    format!("{:04}{:02}{:02}", dt.year(), u8::from(dt.month()), dt.day())
}

/// Format `unix_secs` as `YYYYMMDDHHMMSS`.
#[must_use]
pub fn timestamp_ymdhms(unix_secs: u64) -> String {
    let dt = offset_date_time(unix_secs);
    format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

fn offset_date_time(unix_secs: u64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(unix_secs as i64)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
