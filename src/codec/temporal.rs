use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const ZONED_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

/// Interpret a naive timestamp as UTC.
#[must_use]
pub fn naive_as_utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    naive.and_utc().fixed_offset()
}

/// Parse the textual timestamp forms drivers hand back.
///
/// RFC 3339 and `YYYY-MM-DD HH:MM:SS[.fff]±HH:MM` keep their offset; forms without an offset
/// (including SQLite's `CURRENT_TIMESTAMP`) are UTC; a bare date is midnight UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for fmt in ZONED_TIMESTAMP_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive_as_utc(naive));
        }
    }
    parse_date(text)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(naive_as_utc)
}

/// Seconds since the Unix epoch, UTC.
#[must_use]
pub fn from_epoch_seconds(secs: i64) -> Option<DateTime<FixedOffset>> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.fixed_offset())
}

#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

#[must_use]
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn naive_text_is_utc() {
        let parsed = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap());
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn offsets_are_kept() {
        let parsed = parse_timestamp("2024-03-01T12:30:00.250+02:00").unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 2 * 3600);
        let expected =
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap() + chrono::Duration::milliseconds(250);
        assert_eq!(parsed, expected);

        let spaced = parse_timestamp("2024-03-01 12:30:00+02:00").unwrap();
        assert_eq!(spaced.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn epoch_and_date_only() {
        assert_eq!(
            from_epoch_seconds(86_400).unwrap(),
            Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(parse_time("07:15").unwrap(), NaiveTime::from_hms_opt(7, 15, 0).unwrap());
    }
}
