use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Time format understood by both fetch utilities (`YYYY,MM,DD,HH,MM,SS`).
pub const NATIVE_TIME_FORMAT: &str = "%Y,%m,%d,%H,%M,%S";

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y,%m,%d,%H,%M,%S",
];

/// Parse a timestamp and normalize it to UTC.
///
/// Accepted inputs:
/// - RFC 3339 / ISO 8601 with an offset, e.g. "2019-07-25T07:00:00+07:00"
/// - "YYYY-MM-DD HH:MM:SS" with an explicit offset suffix ("+0700")
/// - naive forms ("YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS", "YYYY,MM,DD,HH,MM,SS"),
///   taken as UTC
/// - "YYYY-MM-DD" or "YYYYMMDD" (midnight UTC)
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("empty timestamp".into()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return midnight(d, trimmed);
    }
    // YYYYMMDD
    if trimmed.len() == 8 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let invalid = || Error::Validation(format!("invalid YYYYMMDD date: {trimmed}"));
        let year: i32 = trimmed[0..4].parse().map_err(|_| invalid())?;
        let month: u32 = trimmed[4..6].parse().map_err(|_| invalid())?;
        let day: u32 = trimmed[6..8].parse().map_err(|_| invalid())?;
        let d = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
        return midnight(d, trimmed);
    }

    Err(Error::Validation(format!(
        "unsupported timestamp format: {trimmed}"
    )))
}

fn midnight(d: NaiveDate, raw: &str) -> Result<DateTime<Utc>> {
    let dt = d
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Validation(format!("invalid date: {raw}")))?;
    Ok(Utc.from_utc_datetime(&dt))
}

pub fn format_timestamp(dt: &DateTime<Utc>, fmt: &str) -> String {
    dt.format(fmt).to_string()
}

/// Render a `start:end` window; an open end renders as `start:`.
pub fn format_window(start: &DateTime<Utc>, end: Option<&DateTime<Utc>>) -> String {
    let end = end
        .map(|e| format_timestamp(e, NATIVE_TIME_FORMAT))
        .unwrap_or_default();
    format!("{}:{end}", format_timestamp(start, NATIVE_TIME_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_naive_as_utc() {
        let dt = parse_timestamp("2019-07-25 00:00:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2019, 7, 25, 0, 0, 0).unwrap());

        let dt = parse_timestamp("2019-07-25T01:30:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2019, 7, 25, 1, 30, 0).unwrap());
    }

    #[test]
    fn converts_offsets_to_utc() {
        let dt = parse_timestamp("2019-07-25T07:00:00+07:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2019, 7, 25, 0, 0, 0).unwrap());

        let dt = parse_timestamp("2019-07-25 07:00:00+0700").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2019, 7, 25, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_date_only_forms() {
        let expected = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2019-01-01").unwrap(), expected);
        assert_eq!(parse_timestamp("20190101").unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").unwrap_err().is_validation());
        assert!(parse_timestamp("   ").unwrap_err().is_validation());
    }

    #[test]
    fn formats_windows() {
        let start = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2019, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(
            format_window(&start, Some(&end)),
            "2019,01,01,00,00,00:2019,01,01,01,00,00"
        );
        assert_eq!(format_window(&start, None), "2019,01,01,00,00,00:");
    }
}
