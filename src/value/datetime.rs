//! Date-time text and OLE automation date conversions

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::constants::ole_date::{EPOCH, MILLIS_PER_DAY};
use crate::error::{Error, Result};

const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const ISO_NANOS: &str = "%Y-%m-%dT%H:%M:%S%.9f";

/// Extended ISO-8601 text, millisecond precision unless the value carries
/// sub-millisecond digits.
pub fn format_iso(dt: &NaiveDateTime) -> String {
    let pattern = if dt.nanosecond() % 1_000_000 == 0 { ISO_MILLIS } else { ISO_NANOS };
    dt.format(pattern).to_string()
}

/// Parse extended ISO-8601 text.
///
/// Accepts an RFC 3339 timestamp (converted to local time), a naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` (a space separator works too), or a bare date.
pub fn parse_iso(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Ok(zoned.with_timezone(&Local).naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|_| Error::format(format!("invalid date-time text '{text}'")))
}

fn ole_epoch() -> Result<NaiveDate> {
    let (y, m, d) = EPOCH;
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| Error::format("invalid OLE epoch"))
}

/// Days since 1899-12-30, time of day as the fraction.
///
/// Dates before the epoch keep the time of day as a positive magnitude, so
/// 1899-12-29 06:00 is `-1.25`.
pub fn to_ole(dt: &NaiveDateTime) -> Result<f64> {
    let days = (dt.date() - ole_epoch()?).num_days() as f64;
    let time = dt.time();
    let millis = f64::from(time.num_seconds_from_midnight()) * 1000.0
        + f64::from(time.nanosecond()) / 1_000_000.0;
    let fraction = millis / MILLIS_PER_DAY;
    Ok(if days < 0.0 { days - fraction } else { days + fraction })
}

/// Inverse of [`to_ole`], rounded to the nearest millisecond.
pub fn from_ole(value: f64) -> Result<NaiveDateTime> {
    let out_of_range = || Error::format(format!("OLE date {value} out of range"));
    if !value.is_finite() {
        return Err(out_of_range());
    }

    let whole = value.trunc();
    let millis = ((value - whole).abs() * MILLIS_PER_DAY).round();
    let days = TimeDelta::try_days(whole as i64).ok_or_else(out_of_range)?;
    let time = TimeDelta::try_milliseconds(millis as i64).ok_or_else(out_of_range)?;

    ole_epoch()?
        .and_time(NaiveTime::MIN)
        .checked_add_signed(days)
        .and_then(|dt| dt.checked_add_signed(time))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_milli_opt(h, mi, s, ms)
            .unwrap()
    }

    #[test]
    fn test_format_iso_milliseconds() {
        assert_eq!(format_iso(&at(2024, 3, 9, 14, 5, 7, 250)), "2024-03-09T14:05:07.250");
        assert_eq!(format_iso(&at(2024, 3, 9, 0, 0, 0, 0)), "2024-03-09T00:00:00.000");
    }

    #[test]
    fn test_format_iso_keeps_sub_millisecond_digits() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_nano_opt(1, 2, 3, 123_456_789)
            .unwrap();
        let text = format_iso(&dt);
        assert_eq!(text, "2020-01-01T01:02:03.123456789");
        assert_eq!(parse_iso(&text).unwrap(), dt);
    }

    #[test]
    fn test_parse_iso_variants() {
        let expected = at(2024, 3, 9, 14, 5, 7, 250);
        assert_eq!(parse_iso("2024-03-09T14:05:07.250").unwrap(), expected);
        assert_eq!(parse_iso("2024-03-09 14:05:07.25").unwrap(), expected);
        assert_eq!(parse_iso("2024-03-09").unwrap(), at(2024, 3, 9, 0, 0, 0, 0));
        assert_eq!(parse_iso("2024-03-09T14:05").unwrap(), at(2024, 3, 9, 14, 5, 0, 0));
    }

    #[test]
    fn test_parse_iso_rejects_garbage() {
        assert!(parse_iso("yesterday").is_err());
        assert!(parse_iso("2024-13-40").is_err());
    }

    #[test]
    fn test_ole_epoch_and_fractions() {
        assert_eq!(to_ole(&at(1899, 12, 30, 0, 0, 0, 0)).unwrap(), 0.0);
        assert_eq!(to_ole(&at(1899, 12, 31, 12, 0, 0, 0)).unwrap(), 1.5);
        assert_eq!(to_ole(&at(1899, 12, 29, 6, 0, 0, 0)).unwrap(), -1.25);
        assert_eq!(from_ole(-1.25).unwrap(), at(1899, 12, 29, 6, 0, 0, 0));
        assert_eq!(from_ole(2.75).unwrap(), at(1900, 1, 1, 18, 0, 0, 0));
    }

    #[test]
    fn test_ole_round_trip_to_millisecond() {
        let dt = at(2031, 7, 15, 23, 59, 59, 999);
        assert_eq!(from_ole(to_ole(&dt).unwrap()).unwrap(), dt);
    }

    #[test]
    fn test_from_ole_rejects_non_finite() {
        assert!(from_ole(f64::NAN).is_err());
        assert!(from_ole(f64::INFINITY).is_err());
        assert!(from_ole(1e300).is_err());
    }
}
