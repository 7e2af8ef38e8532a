//! Cron schedules for query rules.
//! Supports: "MIN HOUR DOM MON DOW" and "SEC MIN HOUR DOM MON DOW"
//! Fields: *, ?, N, a-b, */N, a-b/N, lists, month and weekday names
//! Descriptors: @yearly, @monthly, @weekly, @daily, @hourly, @every 1h30m
//! Example: "0 8 * * *" = every day at 8:00

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use esalert_core::{AlertError, Result};

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches before giving up.
const SEARCH_YEARS: i32 = 5;

/// A parsed rule schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed interval between runs.
    Every(Duration),
    Cron(CronFields),
}

/// Bitmasks of allowed values per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFields {
    seconds: u64,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_any: bool,
    dow_any: bool,
}

impl Schedule {
    /// Parse a cron expression or descriptor.
    pub fn parse(expr: &str) -> Result<Self> {
        let expr = expr.trim();
        if let Some(descriptor) = expr.strip_prefix('@') {
            return parse_descriptor(descriptor);
        }

        let parts: Vec<&str> = expr.split_whitespace().collect();
        let (sec, rest) = match parts.len() {
            5 => ("0", &parts[..]),
            6 => (parts[0], &parts[1..]),
            n => {
                return Err(AlertError::Schedule(format!(
                    "expected 5 or 6 fields in '{expr}', found {n}"
                )));
            }
        };

        Ok(Schedule::Cron(CronFields {
            seconds: parse_field(sec, 0, 59, &[])?,
            minutes: parse_field(rest[0], 0, 59, &[])?,
            hours: parse_field(rest[1], 0, 23, &[])?,
            days_of_month: parse_field(rest[2], 1, 31, &[])?,
            months: parse_field(rest[3], 1, 12, &MONTH_NAMES)?,
            days_of_week: parse_dow(rest[4])?,
            dom_any: is_wildcard(rest[2]),
            dow_any: is_wildcard(rest[4]),
        }))
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Every(interval) => truncate_to_second(after).checked_add_signed(*interval),
            Schedule::Cron(fields) => fields.next_after(after),
        }
    }
}

impl std::str::FromStr for Schedule {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

impl CronFields {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t = truncate_to_second(after) + Duration::seconds(1);
        let limit = after.year() + SEARCH_YEARS;

        while t.year() <= limit {
            if !has(self.months, t.month()) {
                let (y, m) = if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
                t = Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&t) {
                t = (t.date_naive() + Duration::days(1)).and_hms_opt(0, 0, 0)?.and_utc();
                continue;
            }
            if !has(self.hours, t.hour()) {
                t = t.with_minute(0)?.with_second(0)? + Duration::hours(1);
                continue;
            }
            if !has(self.minutes, t.minute()) {
                t = t.with_second(0)? + Duration::minutes(1);
                continue;
            }
            if !has(self.seconds, t.second()) {
                t += Duration::seconds(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    /// Restricted day-of-month and day-of-week match if either does.
    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom = has(self.days_of_month, t.day());
        let dow = has(self.days_of_week, t.weekday().num_days_from_sunday());
        if self.dom_any || self.dow_any {
            dom && dow
        } else {
            dom || dow
        }
    }
}

fn has(mask: u64, v: u32) -> bool {
    mask & (1u64 << v) != 0
}

fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::nanoseconds(i64::from(t.nanosecond()))
}

fn is_wildcard(field: &str) -> bool {
    field.starts_with('*') || field.starts_with('?')
}

fn parse_descriptor(descriptor: &str) -> Result<Schedule> {
    let expanded = match descriptor {
        "yearly" | "annually" => "0 0 0 1 1 *",
        "monthly" => "0 0 0 1 * *",
        "weekly" => "0 0 0 * * 0",
        "daily" | "midnight" => "0 0 0 * * *",
        "hourly" => "0 0 * * * *",
        other => {
            let Some(interval) = other.strip_prefix("every ") else {
                return Err(AlertError::Schedule(format!("unrecognized descriptor '@{other}'")));
            };
            return parse_interval(interval.trim()).map(Schedule::Every);
        }
    };
    Schedule::parse(expanded)
}

/// Parse durations like `90s`, `5m` or `1h30m`.
fn parse_interval(s: &str) -> Result<Duration> {
    let invalid = || AlertError::Schedule(format!("invalid interval '{s}'"));
    let mut total = 0i64;
    let mut digits = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: i64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(invalid()),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }
    if !digits.is_empty() || total <= 0 {
        return Err(invalid());
    }
    Duration::try_seconds(total).ok_or_else(invalid)
}

/// Day-of-week accepts 7 as Sunday.
fn parse_dow(field: &str) -> Result<u64> {
    let mask = parse_field(field, 0, 7, &DAY_NAMES)?;
    let sunday = if has(mask, 7) { 1 } else { 0 };
    Ok((mask & !(1u64 << 7)) | sunday)
}

/// Parse a cron field into a bitmask of allowed values.
fn parse_field(field: &str, min: u32, max: u32, names: &[&str]) -> Result<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        mask |= parse_range(part, min, max, names)
            .map_err(|e| AlertError::Schedule(format!("field '{field}': {e}")))?;
    }
    Ok(mask)
}

fn parse_range(part: &str, min: u32, max: u32, names: &[&str]) -> std::result::Result<u64, String> {
    let (range, step) = match part.split_once('/') {
        Some((r, s)) => {
            let step: u32 = s.parse().map_err(|_| format!("bad step '{s}'"))?;
            if step == 0 {
                return Err("step must be positive".into());
            }
            (r, Some(step))
        }
        None => (part, None),
    };

    let (start, end) = if range == "*" || range == "?" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (parse_value(a, min, names)?, parse_value(b, min, names)?)
    } else {
        let v = parse_value(range, min, names)?;
        // "N/step" runs from N to the top of the field
        (v, if step.is_some() { max } else { v })
    };

    if start < min || end > max || start > end {
        return Err(format!("'{range}' outside {min}-{max}"));
    }

    let step = step.unwrap_or(1) as usize;
    Ok((start..=end).step_by(step).fold(0u64, |mask, v| mask | (1u64 << v)))
}

fn parse_value(s: &str, min: u32, names: &[&str]) -> std::result::Result<u32, String> {
    if let Ok(n) = s.parse() {
        return Ok(n);
    }
    let lower = s.to_ascii_lowercase();
    names
        .iter()
        .position(|name| *name == lower)
        .map(|i| i as u32 + min)
        .ok_or_else(|| format!("bad value '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
        Schedule::parse(expr).unwrap().next_after(after).unwrap()
    }

    #[test]
    fn test_every_hour() {
        let n = next("0 * * * *", at(2026, 2, 22, 10, 30, 0));
        assert_eq!(n, at(2026, 2, 22, 11, 0, 0));
    }

    #[test]
    fn test_specific_time() {
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 7, 0, 0)), at(2026, 2, 22, 8, 0, 0));
        // already past today, roll to tomorrow
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 8, 0, 0)), at(2026, 2, 23, 8, 0, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let n = next("*/15 * * * *", at(2026, 2, 22, 10, 2, 0));
        assert_eq!(n, at(2026, 2, 22, 10, 15, 0));
    }

    #[test]
    fn test_seconds_field() {
        let n = next("*/30 * * * * *", at(2026, 2, 22, 10, 0, 10));
        assert_eq!(n, at(2026, 2, 22, 10, 0, 30));
    }

    #[test]
    fn test_ranges_lists_and_names() {
        // weekdays at 9:00 and 17:00; 2026-02-21 is a Saturday
        let n = next("0 9,17 * * mon-fri", at(2026, 2, 21, 12, 0, 0));
        assert_eq!(n, at(2026, 2, 23, 9, 0, 0));
        let n = next("0 0 1 jul *", at(2026, 2, 21, 0, 0, 0));
        assert_eq!(n, at(2026, 7, 1, 0, 0, 0));
        let n = next("10-20/5 * * * *", at(2026, 2, 21, 0, 16, 0));
        assert_eq!(n, at(2026, 2, 21, 0, 20, 0));
    }

    #[test]
    fn test_dom_dow_either_matches() {
        // the 17th, or any Sunday; 2026-02-17 is a Tuesday, 2026-02-22 a Sunday
        let s = Schedule::parse("0 0 17 * 0").unwrap();
        assert_eq!(s.next_after(at(2026, 2, 16, 0, 0, 0)).unwrap(), at(2026, 2, 17, 0, 0, 0));
        assert_eq!(s.next_after(at(2026, 2, 17, 0, 0, 0)).unwrap(), at(2026, 2, 22, 0, 0, 0));
        // 7 is also Sunday
        assert_eq!(Schedule::parse("0 0 17 * 7").unwrap(), s);
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(next("@daily", at(2026, 2, 22, 7, 0, 0)), at(2026, 2, 23, 0, 0, 0));
        assert_eq!(next("@hourly", at(2026, 2, 22, 7, 5, 0)), at(2026, 2, 22, 8, 0, 0));
        assert_eq!(next("@yearly", at(2026, 2, 22, 7, 5, 0)), at(2027, 1, 1, 0, 0, 0));
        assert_eq!(Schedule::parse("@annually").unwrap(), Schedule::parse("@yearly").unwrap());
    }

    #[test]
    fn test_every_interval() {
        let s = Schedule::parse("@every 1h30m").unwrap();
        assert_eq!(s, Schedule::Every(Duration::minutes(90)));
        assert_eq!(s.next_after(at(2026, 2, 22, 7, 0, 0)).unwrap(), at(2026, 2, 22, 8, 30, 0));
        assert!(Schedule::parse("@every 0s").is_err());
        assert!(Schedule::parse("@every 5").is_err());
        assert!(Schedule::parse("@every 5d").is_err());
    }

    #[test]
    fn test_oversized_interval_rejected() {
        for bad in ["@every 99999999999999999s", "@every 3000000000000000h", "@every 1s9223372036854775807s"] {
            let err = Schedule::parse(bad).unwrap_err();
            assert!(matches!(err, AlertError::Schedule(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_interval_past_calendar_end_gives_none() {
        let s = Schedule::parse("@every 9000000000000s").unwrap();
        assert!(s.next_after(at(2026, 2, 22, 7, 0, 0)).is_none());
    }

    #[test]
    fn test_impossible_date_gives_none() {
        let s = Schedule::parse("0 0 30 2 *").unwrap();
        assert!(s.next_after(at(2026, 1, 1, 0, 0, 0)).is_none());
    }

    #[test]
    fn test_invalid_expression() {
        for bad in ["bad", "* * *", "60 * * * *", "* 24 * * *", "*/0 * * * *", "5-1 * * * *", "@sometimes"] {
            let err = Schedule::parse(bad).unwrap_err();
            assert!(matches!(err, AlertError::Schedule(_)), "{bad}: {err}");
        }
    }
}
