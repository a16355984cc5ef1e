use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::error::Error;

/// Schedule day. The only day-name table in the crate: stored schedules use the Indonesian
/// names, English names are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub fn weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        match date.weekday() {
            Weekday::Mon => DayOfWeek::Monday,
            Weekday::Tue => DayOfWeek::Tuesday,
            Weekday::Wed => DayOfWeek::Wednesday,
            Weekday::Thu => DayOfWeek::Thursday,
            Weekday::Fri => DayOfWeek::Friday,
            Weekday::Sat => DayOfWeek::Saturday,
            Weekday::Sun => DayOfWeek::Sunday,
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Senin",
            DayOfWeek::Tuesday => "Selasa",
            DayOfWeek::Wednesday => "Rabu",
            DayOfWeek::Thursday => "Kamis",
            DayOfWeek::Friday => "Jumat",
            DayOfWeek::Saturday => "Sabtu",
            DayOfWeek::Sunday => "Minggu",
        }
    }

    /// Signed day shift (within -3..=3) that moves `date` onto this weekday.
    pub fn nearest_shift_from(self, date: NaiveDate) -> i64 {
        let from = date.weekday().num_days_from_monday() as i64;
        let to = self.weekday().num_days_from_monday() as i64;
        let mut diff = (to - from).rem_euclid(7);
        if diff > 3 {
            diff -= 7;
        }
        diff
    }
}

impl FromStr for DayOfWeek {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "senin" | "monday" | "mon" => Ok(DayOfWeek::Monday),
            "selasa" | "tuesday" | "tue" => Ok(DayOfWeek::Tuesday),
            "rabu" | "wednesday" | "wed" => Ok(DayOfWeek::Wednesday),
            "kamis" | "thursday" | "thu" => Ok(DayOfWeek::Thursday),
            "jumat" | "jum'at" | "friday" | "fri" => Ok(DayOfWeek::Friday),
            "sabtu" | "saturday" | "sat" => Ok(DayOfWeek::Saturday),
            "minggu" | "ahad" | "sunday" | "sun" => Ok(DayOfWeek::Sunday),
            other => Err(Error::parse(format!("unknown day name '{other}'"))),
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_name())
    }
}

/// One dated instance of a weekly schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub schedule_id: i64,
    pub date: NaiveDate,
    pub ends_at: NaiveDateTime,
}

/// Dates on which a weekly slot took place: on `day`, on or after `lookback_start`, with
/// `date + end_time <= now`. Plain date arithmetic, so cloning restarts the sequence.
#[derive(Debug, Clone)]
pub struct Occurrences {
    schedule_id: i64,
    end_time: NaiveTime,
    next: NaiveDate,
    now: NaiveDateTime,
}

impl Iterator for Occurrences {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Self::Item> {
        let ends_at = self.next.and_time(self.end_time);
        if ends_at > self.now {
            return None;
        }
        let occurrence = Occurrence {
            schedule_id: self.schedule_id,
            date: self.next,
            ends_at,
        };
        self.next += Duration::weeks(1);
        Some(occurrence)
    }
}

pub fn expand(
    schedule_id: i64,
    day: DayOfWeek,
    end_time: NaiveTime,
    lookback_start: NaiveDate,
    now: NaiveDateTime,
) -> Occurrences {
    let shift = (day.weekday().num_days_from_monday() as i64
        - lookback_start.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    Occurrences {
        schedule_id,
        end_time,
        next: lookback_start + Duration::days(shift),
        now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn every_occurrence_falls_on_the_schedule_day() {
        let now = ymd(2026, 3, 20).and_time(hm(12, 0));
        for day in [
            DayOfWeek::Monday,
            DayOfWeek::Wednesday,
            DayOfWeek::Friday,
            DayOfWeek::Sunday,
        ] {
            for start_offset in 0..7 {
                let start = ymd(2026, 1, 1) + Duration::days(start_offset);
                let dates: Vec<_> = expand(1, day, hm(10, 0), start, now).collect();
                assert!(!dates.is_empty());
                assert!(dates.iter().all(|o| DayOfWeek::of(o.date) == day));
                assert!(dates.iter().all(|o| o.date >= start));
                assert!(dates.windows(2).all(|w| w[1].date - w[0].date == Duration::weeks(1)));
            }
        }
    }

    #[test]
    fn session_ending_exactly_now_is_eligible() {
        let monday = ymd(2026, 3, 16);
        let now = monday.and_time(hm(8, 30));
        let dates: Vec<_> = expand(1, DayOfWeek::Monday, hm(8, 30), monday, now).collect();
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].ends_at, now);

        let one_second_early = now - Duration::seconds(1);
        assert_eq!(
            expand(1, DayOfWeek::Monday, hm(8, 30), monday, one_second_early).count(),
            0
        );
    }

    #[test]
    fn two_week_lookback_yields_the_two_latest_mondays() {
        let wednesday = ymd(2026, 3, 18);
        let now = wednesday.and_time(hm(9, 0));
        let start = wednesday - Duration::days(14);
        let dates: Vec<_> = expand(7, DayOfWeek::Monday, hm(8, 30), start, now)
            .map(|o| o.date)
            .collect();
        assert_eq!(dates, vec![ymd(2026, 3, 9), ymd(2026, 3, 16)]);
    }

    #[test]
    fn expansion_is_restartable() {
        let now = ymd(2026, 3, 18).and_time(hm(9, 0));
        let occurrences = expand(1, DayOfWeek::Tuesday, hm(7, 0), ymd(2026, 2, 1), now);
        let first: Vec<_> = occurrences.clone().collect();
        let second: Vec<_> = occurrences.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn day_names_parse_in_both_languages() {
        assert_eq!("Senin".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!(" jumat ".parse::<DayOfWeek>().unwrap(), DayOfWeek::Friday);
        assert_eq!("Sunday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Sunday);
        assert!("Someday".parse::<DayOfWeek>().is_err());
        assert_eq!(DayOfWeek::Saturday.to_string(), "Sabtu");
    }

    #[test]
    fn nearest_shift_stays_within_three_days() {
        // 2026-03-18 is a Wednesday.
        let wednesday = ymd(2026, 3, 18);
        assert_eq!(DayOfWeek::Wednesday.nearest_shift_from(wednesday), 0);
        assert_eq!(DayOfWeek::Saturday.nearest_shift_from(wednesday), 3);
        assert_eq!(DayOfWeek::Sunday.nearest_shift_from(wednesday), -3);
        assert_eq!(DayOfWeek::Monday.nearest_shift_from(wednesday), -2);
    }
}
