//! Timestamps used by recorded histories.
//!
//! Records carry absolute, timezone-free date-times. The playback clock works
//! in seconds elapsed since the global simulation start; the helpers here
//! convert between the two.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

/// Absolute instant of a recorded state.
pub type Timestamp = NaiveDateTime;

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%YT%H:%M:%S%.f",
    "%m/%d/%YT%H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Parses a timestamp token from a log record.
///
/// Accepted forms, tried in order:
/// - RFC 3339 with offset (`2017-03-01T10:00:00Z`), normalized to UTC
/// - ISO date-time without offset, optional fraction (`2017-03-01T10:00:00.250`)
/// - US numeric date-time (`03/01/2017T10:00:00`)
/// - bare dates (`2017-03-01`, `03/01/2017`) at midnight
/// - decimal seconds since the Unix epoch (`12.5`)
pub fn parse_timestamp(token: &str) -> Option<Timestamp> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.naive_utc());
    }
    for format in DATE_TIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(token, format) {
            return Some(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(token, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .map(from_seconds)
}

/// The Unix epoch as a naive timestamp.
pub fn epoch() -> Timestamp {
    // NaiveDateTime defaults to 1970-01-01T00:00:00
    NaiveDateTime::default()
}

/// Timestamp `secs` seconds after the Unix epoch.
pub fn from_seconds(secs: f64) -> Timestamp {
    add_seconds(epoch(), secs)
}

/// Shifts a timestamp by a (possibly negative, fractional) number of seconds.
///
/// Saturates at the representable range instead of overflowing.
pub fn add_seconds(ts: Timestamp, secs: f64) -> Timestamp {
    let nanos = (secs * 1e9).round();
    let shifted = if nanos.abs() < i64::MAX as f64 {
        ts.checked_add_signed(Duration::nanoseconds(nanos as i64))
    } else {
        None
    };
    shifted.unwrap_or(if secs > 0.0 {
        NaiveDateTime::MAX
    } else {
        NaiveDateTime::MIN
    })
}

/// Seconds elapsed from `from` to `to` (negative if `to` is earlier).
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    let delta = to - from;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_iso_and_rfc3339() {
        let a = parse_timestamp("2017-03-01T10:00:00").unwrap();
        let b = parse_timestamp("2017-03-01T10:00:00Z").unwrap();
        let c = parse_timestamp("2017-03-01T12:00:00+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);

        let frac = parse_timestamp("2017-03-01T10:00:00.250").unwrap();
        assert_relative_eq!(seconds_between(a, frac), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_parse_us_and_bare_dates() {
        let us = parse_timestamp("03/01/2017T10:00:00").unwrap();
        let iso = parse_timestamp("2017-03-01T10:00:00").unwrap();
        assert_eq!(us, iso);

        let midnight = parse_timestamp("03/01/2017").unwrap();
        assert_relative_eq!(seconds_between(midnight, iso), 36000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_parse_epoch_seconds() {
        let ts = parse_timestamp("12.5").unwrap();
        assert_relative_eq!(seconds_between(epoch(), ts), 12.5, epsilon = 1e-9);
        assert!(parse_timestamp("-3").is_some());
        assert!(parse_timestamp("NaN").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_add_seconds_saturates() {
        assert_eq!(add_seconds(epoch(), 1e30), NaiveDateTime::MAX);
        assert_eq!(add_seconds(epoch(), -1e30), NaiveDateTime::MIN);
    }
}
