//! Minimal 5-field cron expression parser and next-fire calculation.
//!
//! Fields are `minute hour day-of-month month day-of-week`, each either
//! `*`, a comma list, a range `a-b`, or a step `*/n`. Next-fire is computed
//! by walking forward minute-by-minute over a naive (UTC, DST-unaware)
//! clock -- see the module-level note in `super` for why that's the chosen
//! behavior on ambiguous boundaries.

use crate::error::SchedulerError;
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    allowed: Vec<u32>,
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        self.allowed.contains(&value)
    }

    fn parse(spec: &str, min: u32, max: u32) -> Result<Field, SchedulerError> {
        if spec == "*" {
            return Ok(Field {
                allowed: (min..=max).collect(),
            });
        }
        if let Some(step_spec) = spec.strip_prefix("*/") {
            let step: u32 = step_spec
                .parse()
                .map_err(|_| SchedulerError::InvalidCronExpression(spec.to_string()))?;
            if step == 0 {
                return Err(SchedulerError::InvalidCronExpression(spec.to_string()));
            }
            return Ok(Field {
                allowed: (min..=max).step_by(step as usize).collect(),
            });
        }
        let mut allowed = Vec::new();
        for part in spec.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo
                    .parse()
                    .map_err(|_| SchedulerError::InvalidCronExpression(spec.to_string()))?;
                let hi: u32 = hi
                    .parse()
                    .map_err(|_| SchedulerError::InvalidCronExpression(spec.to_string()))?;
                if lo > hi || hi > max || lo < min {
                    return Err(SchedulerError::InvalidCronExpression(spec.to_string()));
                }
                allowed.extend(lo..=hi);
            } else {
                let v: u32 = part
                    .parse()
                    .map_err(|_| SchedulerError::InvalidCronExpression(spec.to_string()))?;
                if v < min || v > max {
                    return Err(SchedulerError::InvalidCronExpression(spec.to_string()));
                }
                allowed.push(v);
            }
        }
        if allowed.is_empty() {
            return Err(SchedulerError::InvalidCronExpression(spec.to_string()));
        }
        allowed.sort_unstable();
        allowed.dedup();
        Ok(Field { allowed })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

/// Bound on how far forward `next_fire` will search before giving up --
/// four years of minutes, comfortably past any cron cadence that can ever
/// actually fire (e.g. `0 0 29 2 *` still recurs within this window).
const MAX_MINUTES_SEARCHED: i64 = 4 * 365 * 24 * 60;

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<CronSchedule, SchedulerError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(SchedulerError::InvalidCronExpression(expression.to_string()));
        }
        Ok(CronSchedule {
            minute: Field::parse(parts[0], 0, 59)?,
            hour: Field::parse(parts[1], 0, 23)?,
            day_of_month: Field::parse(parts[2], 1, 31)?,
            month: Field::parse(parts[3], 1, 12)?,
            day_of_week: Field::parse(parts[4], 0, 6)?,
        })
    }

    fn matches(&self, dt: NaiveDateTime) -> bool {
        self.minute.matches(dt.minute())
            && self.hour.matches(dt.hour())
            && self.day_of_month.matches(dt.day())
            && self.month.matches(dt.month())
            && self.day_of_week.matches(dt.weekday().num_days_from_sunday())
    }

    /// First minute-boundary strictly after `from` that satisfies every
    /// field. Walking minute-by-minute rather than jumping is simple and
    /// correct for a 1s-resolution scheduler tick; a leap-day or
    /// month-boundary cadence is handled the same way as any other, since
    /// there is no DST in a naive UTC clock to create an ambiguous hour.
    pub fn next_fire(&self, from: NaiveDateTime) -> Result<NaiveDateTime, SchedulerError> {
        let mut candidate = from
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(from)
            + Duration::minutes(1);
        for _ in 0..MAX_MINUTES_SEARCHED {
            if self.matches(candidate) {
                return Ok(candidate);
            }
            candidate += Duration::minutes(1);
        }
        Err(SchedulerError::InvalidCronExpression(
            "no matching fire time found within search window".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn every_minute_fires_one_minute_later() {
        let schedule = CronSchedule::parse("* * * * *").unwrap();
        let next = schedule.next_fire(dt(2026, 1, 1, 0, 0)).unwrap();
        assert_eq!(next, dt(2026, 1, 1, 0, 1));
    }

    #[test]
    fn daily_at_specific_hour() {
        let schedule = CronSchedule::parse("30 9 * * *").unwrap();
        let next = schedule.next_fire(dt(2026, 1, 1, 10, 0)).unwrap();
        assert_eq!(next, dt(2026, 1, 2, 9, 30));
    }

    #[test]
    fn step_field_parses_every_fifteen_minutes() {
        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        let next = schedule.next_fire(dt(2026, 1, 1, 0, 16)).unwrap();
        assert_eq!(next, dt(2026, 1, 1, 0, 30));
    }

    #[test]
    fn invalid_field_count_is_rejected() {
        assert!(CronSchedule::parse("* * *").is_err());
    }

    #[test]
    fn leap_day_schedule_lands_on_february_29() {
        let schedule = CronSchedule::parse("0 0 29 2 *").unwrap();
        let next = schedule.next_fire(dt(2023, 3, 1, 0, 0)).unwrap();
        assert_eq!(next, dt(2024, 2, 29, 0, 0));
    }
}
