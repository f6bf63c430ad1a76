//! EventBridge schedule expressions
//!
//! Supports `cron(min hour day-of-month month day-of-week year)` and
//! `rate(value unit)`. Validation follows EventBridge rules: six cron fields,
//! exactly one of day-of-month / day-of-week is `?`, and `rate` units agree
//! in number with their value.

use crate::error::{Result, StackError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleExpression {
    Cron(CronFields),
    Rate { value: u32, unit: RateUnit },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronFields {
    pub minutes: String,
    pub hours: String,
    pub day_of_month: String,
    pub month: String,
    pub day_of_week: String,
    pub year: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    Minute,
    Hour,
    Day,
}

impl RateUnit {
    fn name(self, value: u32) -> &'static str {
        match (self, value == 1) {
            (RateUnit::Minute, true) => "minute",
            (RateUnit::Minute, false) => "minutes",
            (RateUnit::Hour, true) => "hour",
            (RateUnit::Hour, false) => "hours",
            (RateUnit::Day, true) => "day",
            (RateUnit::Day, false) => "days",
        }
    }
}

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

impl ScheduleExpression {
    /// Once a day at the given UTC time
    pub fn daily_at(hour: u8, minute: u8) -> Self {
        ScheduleExpression::Cron(CronFields {
            minutes: minute.to_string(),
            hours: hour.to_string(),
            day_of_month: "*".to_string(),
            month: "*".to_string(),
            day_of_week: "?".to_string(),
            year: "*".to_string(),
        })
    }

    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        if let Some(body) = strip_call(trimmed, "cron") {
            parse_cron(expression, body).map(ScheduleExpression::Cron)
        } else if let Some(body) = strip_call(trimmed, "rate") {
            parse_rate(expression, body)
        } else {
            Err(StackError::invalid_schedule(
                expression,
                "expected cron(...) or rate(...)",
            ))
        }
    }
}

impl std::str::FromStr for ScheduleExpression {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleExpression::Cron(c) => write!(
                f,
                "cron({} {} {} {} {} {})",
                c.minutes, c.hours, c.day_of_month, c.month, c.day_of_week, c.year
            ),
            ScheduleExpression::Rate { value, unit } => {
                write!(f, "rate({} {})", value, unit.name(*value))
            }
        }
    }
}

fn strip_call<'a>(expression: &'a str, name: &str) -> Option<&'a str> {
    expression
        .strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
}

fn parse_cron(expression: &str, body: &str) -> Result<CronFields> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(StackError::invalid_schedule(
            expression,
            format!("cron needs 6 fields, found {}", fields.len()),
        ));
    }

    let cron = CronFields {
        minutes: fields[0].to_string(),
        hours: fields[1].to_string(),
        day_of_month: fields[2].to_string(),
        month: fields[3].to_string(),
        day_of_week: fields[4].to_string(),
        year: fields[5].to_string(),
    };

    let dom_any = cron.day_of_month == "?";
    let dow_any = cron.day_of_week == "?";
    if dom_any == dow_any {
        return Err(StackError::invalid_schedule(
            expression,
            "exactly one of day-of-month and day-of-week must be '?'",
        ));
    }

    check_field(expression, "minutes", &cron.minutes, 0, 59, &[])?;
    check_field(expression, "hours", &cron.hours, 0, 23, &[])?;
    check_field(expression, "month", &cron.month, 1, 12, MONTH_NAMES)?;
    check_field(expression, "year", &cron.year, 1970, 2199, &[])?;
    if !dom_any {
        check_day_of_month(expression, &cron.day_of_month)?;
    }
    if !dow_any {
        check_day_of_week(expression, &cron.day_of_week)?;
    }

    Ok(cron)
}

/// Numeric field with `*`, lists, ranges and increments.
fn check_field(
    expression: &str,
    field: &str,
    value: &str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<()> {
    for item in value.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };

        if let Some(step) = step {
            match step.parse::<u32>() {
                Ok(step) if step > 0 => {}
                _ => {
                    return Err(StackError::invalid_schedule(
                        expression,
                        format!("{} increment '{}' must be a positive number", field, step),
                    ))
                }
            }
        }

        if range == "*" {
            continue;
        }

        let bounds: Vec<&str> = match range.split_once('-') {
            Some((start, end)) => vec![start, end],
            None => vec![range],
        };
        for bound in bounds {
            let known_name = names.iter().any(|name| name.eq_ignore_ascii_case(bound));
            let in_range = bound
                .parse::<u32>()
                .map(|n| (min..=max).contains(&n))
                .unwrap_or(false);
            if !known_name && !in_range {
                return Err(StackError::invalid_schedule(
                    expression,
                    format!(
                        "{} value '{}' is outside {}-{}",
                        field, bound, min, max
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_day_of_month(expression: &str, value: &str) -> Result<()> {
    // L = last day, LW = last weekday, 15W = weekday nearest the 15th
    if value == "L" || value == "LW" {
        return Ok(());
    }
    if let Some(day) = value.strip_suffix('W') {
        return check_field(expression, "day-of-month", day, 1, 31, &[]);
    }
    check_field(expression, "day-of-month", value, 1, 31, &[])
}

fn check_day_of_week(expression: &str, value: &str) -> Result<()> {
    // 6L = last Friday, 3#2 = second Tuesday
    if let Some((day, nth)) = value.split_once('#') {
        check_field(expression, "day-of-week", day, 1, 7, DAY_NAMES)?;
        return check_field(expression, "day-of-week occurrence", nth, 1, 5, &[]);
    }
    if value == "L" {
        return Ok(());
    }
    if let Some(day) = value.strip_suffix('L') {
        return check_field(expression, "day-of-week", day, 1, 7, DAY_NAMES);
    }
    check_field(expression, "day-of-week", value, 1, 7, DAY_NAMES)
}

fn parse_rate(expression: &str, body: &str) -> Result<ScheduleExpression> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    let [value, unit] = parts.as_slice() else {
        return Err(StackError::invalid_schedule(
            expression,
            "rate needs a value and a unit",
        ));
    };

    let value: u32 = value.parse().map_err(|_| {
        StackError::invalid_schedule(expression, format!("rate value '{}' is not a number", value))
    })?;
    if value == 0 {
        return Err(StackError::invalid_schedule(
            expression,
            "rate value must be positive",
        ));
    }

    let parsed = match *unit {
        "minute" | "minutes" => RateUnit::Minute,
        "hour" | "hours" => RateUnit::Hour,
        "day" | "days" => RateUnit::Day,
        other => {
            return Err(StackError::invalid_schedule(
                expression,
                format!("unknown rate unit '{}'", other),
            ))
        }
    };

    if parsed.name(value) != *unit {
        return Err(StackError::invalid_schedule(
            expression,
            format!("use '{}' with a value of {}", parsed.name(value), value),
        ));
    }

    Ok(ScheduleExpression::Rate {
        value,
        unit: parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_parses() {
        let schedule = ScheduleExpression::parse("cron(30 10 * * ? *)").unwrap();
        assert_eq!(schedule, ScheduleExpression::daily_at(10, 30));
        assert_eq!(schedule.to_string(), "cron(30 10 * * ? *)");
    }

    #[test]
    fn test_cron_variants() {
        for expression in [
            "cron(0/15 * * * ? *)",
            "cron(0 8 ? * MON-FRI *)",
            "cron(0 12 1,15 * ? 2030)",
            "cron(0 18 L * ? *)",
            "cron(0 9 15W JAN-MAR ? *)",
            "cron(0 9 ? * 6L *)",
            "cron(0 9 ? * 3#2 *)",
        ] {
            assert!(
                ScheduleExpression::parse(expression).is_ok(),
                "{} should parse",
                expression
            );
        }
    }

    #[test]
    fn test_cron_rejections() {
        for expression in [
            "cron(30 10 * * *)",
            "cron(30 10 * * * *)",
            "cron(30 10 ? * ? *)",
            "cron(60 10 * * ? *)",
            "cron(30 24 * * ? *)",
            "cron(30 10 32 * ? *)",
            "cron(30 10 * 13 ? *)",
            "cron(0/0 10 * * ? *)",
            "cron(30 10 ? * 8 *)",
            "30 10 * * ? *",
        ] {
            let err = ScheduleExpression::parse(expression).unwrap_err();
            assert_eq!(err.code(), "E002", "{} should be rejected", expression);
        }
    }

    #[test]
    fn test_rate_expressions() {
        assert_eq!(
            ScheduleExpression::parse("rate(1 day)").unwrap(),
            ScheduleExpression::Rate {
                value: 1,
                unit: RateUnit::Day
            }
        );
        assert_eq!(
            ScheduleExpression::parse("rate(12 hours)")
                .unwrap()
                .to_string(),
            "rate(12 hours)"
        );
        assert!(ScheduleExpression::parse("rate(1 days)").is_err());
        assert!(ScheduleExpression::parse("rate(5 minute)").is_err());
        assert!(ScheduleExpression::parse("rate(0 hours)").is_err());
        assert!(ScheduleExpression::parse("rate(2 weeks)").is_err());
        assert!(ScheduleExpression::parse("rate(day)").is_err());
    }
}
