use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?)?")
        .expect("date pattern is valid")
});

/// Spreadsheet serial numbers below this are not treated as dates.
const SERIAL_DATE_FLOOR: f64 = 25_000.0;
/// Serial day number of 9999-12-31, the last date spreadsheets represent.
const SERIAL_DATE_CEILING: f64 = 2_958_465.0;

/// A source timestamp; `time` is only set when the source carried a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTimestamp {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl SourceTimestamp {
    pub fn date_time(&self) -> Option<NaiveDateTime> {
        self.time.map(|time| self.date.and_time(time))
    }
}

/// Parses a tabular timestamp cell: `dd/mm/yyyy[ HH:MM[:SS]]` first, then spreadsheet serial
/// day numbers, then a generic set of ISO-like formats.
pub fn parse_timestamp(raw: &str) -> Result<SourceTimestamp> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::parse("empty timestamp"));
    }

    if let Some(caps) = DAY_MONTH_YEAR.captures(text) {
        let number = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
        let (day, month) = (number(1).unwrap_or(0), number(2).unwrap_or(0));
        let year = caps[3].parse::<i32>().unwrap_or(0);
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| Error::parse(format!("invalid calendar date '{text}'")))?;
        // An impossible time of day drops the time but keeps the date.
        let time = match (number(4), number(5)) {
            (Some(hour), Some(minute)) => {
                NaiveTime::from_hms_opt(hour, minute, number(6).unwrap_or(0))
            }
            _ => None,
        };
        return Ok(SourceTimestamp { date, time });
    }

    if let Ok(serial) = text.parse::<f64>() {
        if serial.is_finite() && serial > SERIAL_DATE_FLOOR && serial <= SERIAL_DATE_CEILING {
            return from_serial(serial);
        }
        return Err(Error::parse(format!("'{text}' is not a date")));
    }

    parse_generic(text).ok_or_else(|| Error::parse(format!("unrecognized timestamp '{text}'")))
}

fn from_serial(serial: f64) -> Result<SourceTimestamp> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .ok_or_else(|| Error::parse("spreadsheet epoch"))?;
    let days = serial.trunc() as i64;
    let date = TimeDelta::try_days(days)
        .and_then(|offset| epoch.checked_add_signed(offset))
        .ok_or_else(|| Error::parse(format!("serial day {serial} is out of range")))?;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as u32;
    let time = if seconds == 0 {
        None
    } else {
        NaiveTime::from_num_seconds_from_midnight_opt(seconds.min(86_399), 0)
    };
    Ok(SourceTimestamp { date, time })
}

fn parse_generic(text: &str) -> Option<SourceTimestamp> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        let local = parsed.naive_local();
        return Some(SourceTimestamp { date: local.date(), time: Some(local.time()) });
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(SourceTimestamp { date: parsed.date(), time: Some(parsed.time()) });
        }
    }
    for format in ["%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(SourceTimestamp { date, time: None });
        }
    }
    None
}

/// Parses a stored clock field (`HH:MM`, `HH:MM:SS`, `HH.MM`). Only the first 8 characters
/// are considered, so `07:00:00.000000` is accepted.
pub fn parse_clock(raw: &str) -> Result<NaiveTime> {
    let text: String = raw.trim().chars().take(8).collect();
    ["%H:%M:%S", "%H:%M", "%H.%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&text, format).ok())
        .ok_or_else(|| Error::parse(format!("malformed time '{}'", raw.trim())))
}

/// Parses the `--now` override.
pub fn parse_now(raw: &str) -> Result<NaiveDateTime> {
    let text = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(parsed);
        }
    }
    Err(Error::parse(format!("'{text}' is not YYYY-MM-DD HH:MM[:SS]")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_day_month_year_with_time() {
        let ts = parse_timestamp("16/07/2025 10:01:33").unwrap();
        assert_eq!(ts.date, ymd(2025, 7, 16));
        assert_eq!(ts.time, NaiveTime::from_hms_opt(10, 1, 33));

        let ts = parse_timestamp("3/2/2026").unwrap();
        assert_eq!(ts.date, ymd(2026, 2, 3));
        assert_eq!(ts.time, None);
    }

    #[test]
    fn parses_spreadsheet_serials() {
        let ts = parse_timestamp("45854").unwrap();
        assert_eq!(ts.date, ymd(2025, 7, 16));
        assert_eq!(ts.time, None);

        let ts = parse_timestamp("45854.5").unwrap();
        assert_eq!(ts.time, NaiveTime::from_hms_opt(12, 0, 0));
    }

    #[test]
    fn falls_back_to_generic_formats() {
        assert_eq!(parse_timestamp("2026-01-05").unwrap().date, ymd(2026, 1, 5));
        assert_eq!(parse_timestamp("05-01-2026").unwrap().date, ymd(2026, 1, 5));
        let ts = parse_timestamp("2026-01-05 07:15").unwrap();
        assert_eq!(ts.time, NaiveTime::from_hms_opt(7, 15, 0));
    }

    #[test]
    fn rejects_garbage_and_impossible_dates() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("kemarin").is_err());
        assert!(parse_timestamp("31/02/2026").is_err());
        assert!(parse_timestamp("12").is_err());
    }

    #[test]
    fn out_of_range_serials_are_parse_errors() {
        for raw in ["99999999999", "2958466", "inf", "-inf", "NaN", "1e300"] {
            assert!(
                matches!(parse_timestamp(raw), Err(Error::Parse(_))),
                "{raw} should be rejected"
            );
        }
        assert_eq!(parse_timestamp("2958465").unwrap().date, ymd(9999, 12, 31));
    }

    #[test]
    fn bad_time_of_day_keeps_the_date() {
        let ts = parse_timestamp("16/07/2025 25:00").unwrap();
        assert_eq!(ts.date, ymd(2025, 7, 16));
        assert_eq!(ts.time, None);
        assert_eq!(ts.date_time(), None);
    }

    #[test]
    fn clock_accepts_common_shapes() {
        let half_past_eight = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
        assert_eq!(parse_clock("08:30").unwrap(), half_past_eight);
        assert_eq!(parse_clock("08:30:00").unwrap(), half_past_eight);
        assert_eq!(parse_clock("08.30").unwrap(), half_past_eight);
        assert_eq!(parse_clock("08:30:00.000000").unwrap(), half_past_eight);
        assert!(parse_clock("half past eight").is_err());
        assert!(parse_clock("25:00").is_err());
    }
}
