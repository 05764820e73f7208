pub mod account;
pub mod alert;
pub mod profile;

pub use account::*;
pub use alert::*;
pub use profile::*;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Stored timestamp format. Matches SQLite's datetime() output so end-time
/// arithmetic and range comparisons can run inside single UPDATE statements.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn fmt_ts(t: DateTime<Utc>) -> String {
    t.format(TS_FORMAT).to_string()
}

pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .unwrap_or_default()
        .and_utc()
}
