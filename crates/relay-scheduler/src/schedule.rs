use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};

/// A parsed cron expression, evaluated in UTC.
///
/// Accepts the classic five-field form (`min hour dom month dow`), the
/// six/seven-field form with seconds (and year), and the `@hourly`, `@daily`,
/// `@weekly`, `@monthly`, `@yearly` macros.
///
/// Numeric weekdays follow Unix crontab in the five-field form (0 or 7 is
/// Sunday, 1 is Monday). The six/seven-field form is handed to the `cron`
/// crate as written, where 1 is Sunday. Day names mean the same in both.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let normalized = normalize(expression)?;
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| invalid(expression, e))?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    /// The expression as written by the user.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`; `None` if the schedule has no
    /// future occurrence (e.g. a year field in the past).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Rewrite into the seconds-first dialect the `cron` crate parses.
fn normalize(expression: &str) -> Result<String> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(invalid(expression, "expression is empty"));
    }
    let expanded = match trimmed.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "0 0 0 1 1 *".to_string(),
        "@monthly" => "0 0 0 1 * *".to_string(),
        "@weekly" => "0 0 0 * * SUN".to_string(),
        "@daily" | "@midnight" => "0 0 0 * * *".to_string(),
        "@hourly" => "0 0 * * * *".to_string(),
        m if m.starts_with('@') => return Err(invalid(expression, "unknown macro")),
        _ => match trimmed.split_whitespace().count() {
            5 => {
                let fields: Vec<&str> = trimmed.split_whitespace().collect();
                let day_of_week = unix_day_of_week(fields[4], expression)?;
                format!("0 {} {day_of_week}", fields[..4].join(" "))
            }
            6 | 7 => trimmed.to_string(),
            n => return Err(invalid(expression, format!("expected 5 to 7 fields, got {n}"))),
        },
    };
    Ok(expanded)
}

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Translate a crontab day-of-week field into day names.
///
/// Fields with names or other syntax are left alone for the `cron` crate
/// to judge.
fn unix_day_of_week(field: &str, expression: &str) -> Result<String> {
    if field == "*" || !field.bytes().all(|b| b.is_ascii_digit() || b"*,-/".contains(&b)) {
        return Ok(field.to_string());
    }
    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<usize>()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| invalid(expression, format!("bad day-of-week step in {item:?}")))?;
                (range, Some(step))
            }
            None => (item, None),
        };
        let (first, last) = if range == "*" {
            (0, 7)
        } else if let Some((a, b)) = range.split_once('-') {
            (unix_day(a, expression)?, unix_day(b, expression)?)
        } else {
            let day = unix_day(range, expression)?;
            // `d/n` runs from d to the end of the week
            (day, if step.is_some() { 7 } else { day })
        };
        if first > last {
            return Err(invalid(expression, format!("day-of-week range {range:?} runs backwards")));
        }
        for day in (first..=last).step_by(step.unwrap_or(1)) {
            days[day % 7] = true;
        }
    }
    let names: Vec<&str> = DAY_NAMES
        .iter()
        .zip(days)
        .filter_map(|(name, on)| on.then_some(*name))
        .collect();
    Ok(names.join(","))
}

fn unix_day(value: &str, expression: &str) -> Result<usize> {
    value
        .parse::<usize>()
        .ok()
        .filter(|d| *d <= 7)
        .ok_or_else(|| invalid(expression, format!("day of week {value:?} is not in 0-7")))
}

fn invalid(expression: &str, reason: impl ToString) -> SchedulerError {
    SchedulerError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
