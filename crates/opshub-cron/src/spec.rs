//! Trigger spec grammar and firing-time computation.
//!
//! A job's trigger spec holds one or more comma-separated segments. Each
//! segment is either an interval form (`@every 30s`, `@every 5m`) or a
//! standard 5-field cron expression (`minute hour day-of-month month
//! day-of-week`). Cron fields support `*`, lists, ranges, and steps;
//! month is 1-12 and day-of-week is 0-6 with 0 = Sunday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use opshub_core::error::AppError;
use opshub_core::result::AppResult;

/// One parsed trigger segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Fixed-interval firing.
    Every(IntervalSpec),
    /// Cron-expression firing.
    Cron(CronSchedule),
}

/// Unit of an interval trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
}

/// An `@every <amount><unit>` trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalSpec {
    /// Interval amount, at least 1.
    pub amount: u32,
    /// Interval unit.
    pub unit: IntervalUnit,
}

impl IntervalSpec {
    /// The interval as a duration.
    pub fn period(&self) -> Duration {
        match self.unit {
            IntervalUnit::Seconds => Duration::seconds(i64::from(self.amount)),
            IntervalUnit::Minutes => Duration::minutes(i64::from(self.amount)),
        }
    }
}

/// A parsed 5-field cron expression.
///
/// Each field is a bit set of permitted values. The day fields follow the
/// standard rule: when both day-of-month and day-of-week are restricted,
/// a day matches if either does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    dom: u64,
    months: u64,
    dow: u64,
    dom_star: bool,
    dow_star: bool,
}

impl CronSchedule {
    /// The next instant strictly after `after` matching this schedule.
    ///
    /// Returns `None` for expressions that never fire (e.g. February 30).
    /// Results are at minute resolution; seconds are zeroed.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut t: NaiveDateTime =
            after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        // A schedule that matches nothing within four years (covering a
        // leap cycle) never matches at all.
        let limit = t + Duration::days(366 * 4);

        while t <= limit {
            if !bit(self.months, t.month()) {
                let (year, month) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !bit(self.minutes, t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(DateTime::from_naive_utc_and_offset(t, Utc));
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom_hit = bit(self.dom, date.day());
        let dow_hit = bit(self.dow, date.weekday().num_days_from_sunday());
        match (self.dom_star, self.dow_star) {
            (true, true) => true,
            (true, false) => dow_hit,
            (false, true) => dom_hit,
            (false, false) => dom_hit || dow_hit,
        }
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

/// Parse one trigger segment.
pub fn parse(segment: &str) -> AppResult<TriggerSpec> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(AppError::validation("empty trigger spec segment"));
    }
    if let Some(rest) = segment.strip_prefix("@every ") {
        return parse_interval(rest).map(TriggerSpec::Every);
    }
    parse_cron(segment).map(TriggerSpec::Cron)
}

fn parse_interval(rest: &str) -> AppResult<IntervalSpec> {
    let rest = rest.trim();
    let unit = match rest.chars().last() {
        Some('s') => IntervalUnit::Seconds,
        Some('m') => IntervalUnit::Minutes,
        _ => {
            return Err(AppError::validation(format!(
                "interval '{rest}' must end in 's' or 'm'"
            )));
        }
    };
    let amount: u32 = rest[..rest.len() - 1].parse().map_err(|_| {
        AppError::validation(format!("invalid interval amount in '@every {rest}'"))
    })?;
    if amount == 0 {
        return Err(AppError::validation("interval amount must be at least 1"));
    }
    Ok(IntervalSpec { amount, unit })
}

fn parse_cron(expression: &str) -> AppResult<CronSchedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(AppError::validation(format!(
            "cron expression '{expression}' must have 5 fields, found {}",
            fields.len()
        )));
    }
    Ok(CronSchedule {
        minutes: parse_field(fields[0], 0, 59, "minute")?,
        hours: parse_field(fields[1], 0, 23, "hour")?,
        dom: parse_field(fields[2], 1, 31, "day-of-month")?,
        months: parse_field(fields[3], 1, 12, "month")?,
        dow: parse_field(fields[4], 0, 6, "day-of-week")?,
        dom_star: is_star(fields[2]),
        dow_star: is_star(fields[4]),
    })
}

fn is_star(field: &str) -> bool {
    field == "*" || field.starts_with("*/")
}

fn parse_field(field: &str, min: u32, max: u32, name: &str) -> AppResult<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| {
                    AppError::validation(format!("invalid step in {name} field '{field}'"))
                })?;
                if step == 0 {
                    return Err(AppError::validation(format!(
                        "step must be at least 1 in {name} field '{field}'"
                    )));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (
                parse_value(low, min, max, name)?,
                parse_value(high, min, max, name)?,
            )
        } else {
            let value = parse_value(range, min, max, name)?;
            // A bare value with a step ("5/2") ranges to the field max.
            match step {
                Some(_) => (value, max),
                None => (value, value),
            }
        };

        if low > high {
            return Err(AppError::validation(format!(
                "inverted range in {name} field '{field}'"
            )));
        }

        let step = step.unwrap_or(1);
        let mut value = low;
        while value <= high {
            mask |= 1 << value;
            value += step;
        }
    }
    Ok(mask)
}

fn parse_value(raw: &str, min: u32, max: u32, name: &str) -> AppResult<u32> {
    let value: u32 = raw
        .parse()
        .map_err(|_| AppError::validation(format!("invalid {name} value '{raw}'")))?;
    if value < min || value > max {
        return Err(AppError::validation(format!(
            "{name} value {value} out of range {min}-{max}"
        )));
    }
    Ok(value)
}

/// Compute the next `n` firing instants of a trigger, strictly after
/// `from` and strictly increasing. Cron search is re-seeded from each
/// previous result; intervals are `from + k * period`.
pub fn next_occurrences(
    spec: &TriggerSpec,
    from: DateTime<Utc>,
    n: usize,
) -> AppResult<Vec<DateTime<Utc>>> {
    let mut out = Vec::with_capacity(n);
    match spec {
        TriggerSpec::Every(interval) => {
            let mut t = from;
            for _ in 0..n {
                t += interval.period();
                out.push(t);
            }
        }
        TriggerSpec::Cron(schedule) => {
            let mut t = from;
            for _ in 0..n {
                t = schedule
                    .next_after(t)
                    .ok_or_else(|| AppError::validation("cron expression never fires"))?;
                out.push(t);
            }
        }
    }
    Ok(out)
}
