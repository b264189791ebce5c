// libs/scheduling-cell/src/recurrence.rs
//
// Recurrence rules and their expansion into concrete occurrences. Rules
// travel to and from storage as standard RRULE text attached to the series
// parent; expansion is pure and deterministic, so the same rule and anchor
// always produce the same sequence.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_config::DEFAULT_RECURRENCE_OCCURRENCE_CAP;

use crate::models::SchedulingError;

/// Weekday indices use 0=Sunday..6=Saturday, matching the day picker in the
/// scheduling form.
const WEEKDAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    // "custom" in the scheduling form is weekly with an explicit weekday set.
    #[serde(alias = "custom")]
    Weekly,
    Monthly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceEnd {
    /// No explicit end; expansion stops at the configured occurrence cap.
    Never,
    /// Exactly this many occurrences, the anchor included.
    Count(u32),
    /// Occurrences whose start is at or before this instant, inclusive.
    Until(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub weekdays: BTreeSet<u8>,
    pub end: RecurrenceEnd,
}

impl RecurrenceRule {
    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.interval == 0 {
            return Err(SchedulingError::Validation(
                "recurrence interval must be at least 1".to_string(),
            ));
        }
        if let RecurrenceEnd::Count(0) = self.end {
            return Err(SchedulingError::Validation(
                "recurrence count must be at least 1".to_string(),
            ));
        }
        if let Some(&weekday) = self.weekdays.iter().find(|&&weekday| weekday > 6) {
            return Err(SchedulingError::Validation(format!(
                "weekday index {} out of range (0=Sunday..6=Saturday)",
                weekday
            )));
        }
        Ok(())
    }

    /// Render the rule as RRULE text, e.g.
    /// `FREQ=WEEKLY;INTERVAL=1;BYDAY=MO,WE;COUNT=10`.
    pub fn to_rrule(&self) -> String {
        let mut parts = vec![
            format!("FREQ={}", match self.frequency {
                Frequency::Daily => "DAILY",
                Frequency::Weekly => "WEEKLY",
                Frequency::Monthly => "MONTHLY",
            }),
            format!("INTERVAL={}", self.interval),
        ];

        if !self.weekdays.is_empty() {
            let days: Vec<&str> = self
                .weekdays
                .iter()
                .map(|&weekday| WEEKDAY_CODES[weekday as usize])
                .collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }

        match self.end {
            RecurrenceEnd::Never => {}
            RecurrenceEnd::Count(count) => parts.push(format!("COUNT={}", count)),
            RecurrenceEnd::Until(until) => {
                parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")))
            }
        }

        parts.join(";")
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_rrule())
    }
}

impl FromStr for RecurrenceRule {
    type Err = SchedulingError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let input = input.strip_prefix("RRULE:").unwrap_or(input);

        let mut frequency = None;
        let mut interval = 1u32;
        let mut weekdays = BTreeSet::new();
        let mut count = None;
        let mut until = None;

        for part in input.split(';').filter(|part| !part.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                SchedulingError::Validation(format!("malformed recurrence rule part: {}", part))
            })?;

            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(match value.to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        other => {
                            return Err(SchedulingError::Validation(format!(
                                "unsupported recurrence frequency: {}",
                                other
                            )))
                        }
                    });
                }
                "INTERVAL" => {
                    interval = value.parse().map_err(|_| {
                        SchedulingError::Validation(format!("invalid recurrence interval: {}", value))
                    })?;
                }
                "BYDAY" => {
                    for code in value.split(',') {
                        let index = WEEKDAY_CODES
                            .iter()
                            .position(|&known| known.eq_ignore_ascii_case(code))
                            .ok_or_else(|| {
                                SchedulingError::Validation(format!("unknown weekday: {}", code))
                            })?;
                        weekdays.insert(index as u8);
                    }
                }
                "COUNT" => {
                    count = Some(value.parse::<u32>().map_err(|_| {
                        SchedulingError::Validation(format!("invalid recurrence count: {}", value))
                    })?);
                }
                "UNTIL" => until = Some(parse_until(value)?),
                // WKST and friends are accepted but not significant here.
                _ => {}
            }
        }

        let frequency = frequency.ok_or_else(|| {
            SchedulingError::Validation("recurrence rule is missing FREQ".to_string())
        })?;

        let end = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(SchedulingError::Validation(
                    "COUNT and UNTIL are mutually exclusive".to_string(),
                ))
            }
            (Some(count), None) => RecurrenceEnd::Count(count),
            (None, Some(until)) => RecurrenceEnd::Until(until),
            (None, None) => RecurrenceEnd::Never,
        };

        Ok(RecurrenceRule {
            frequency,
            interval,
            weekdays,
            end,
        })
    }
}

fn parse_until(value: &str) -> Result<DateTime<Utc>, SchedulingError> {
    if let Ok(timestamp) = chrono::NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ") {
        return Ok(timestamp.and_utc());
    }
    // A bare date widens to end-of-day so occurrences on the until date
    // itself stay in the series.
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Ok(date
            .and_hms_opt(23, 59, 59)
            .expect("static time of day")
            .and_utc());
    }
    Err(SchedulingError::Validation(format!(
        "invalid UNTIL value: {}",
        value
    )))
}

/// One concrete time slot generated from a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Expands a recurrence rule from an anchor occurrence into the full ordered
/// sequence of occurrences. Pure: no clock reads, no storage.
#[derive(Debug, Clone)]
pub struct RecurrenceExpander {
    occurrence_cap: usize,
}

impl Default for RecurrenceExpander {
    fn default() -> Self {
        Self::new(DEFAULT_RECURRENCE_OCCURRENCE_CAP)
    }
}

impl RecurrenceExpander {
    /// `occurrence_cap` bounds rules with no end condition.
    pub fn new(occurrence_cap: usize) -> Self {
        Self { occurrence_cap }
    }

    /// The first element of the result is always the anchor itself; every
    /// occurrence keeps the anchor's duration.
    pub fn expand(
        &self,
        rule: &RecurrenceRule,
        first_start: DateTime<Utc>,
        first_end: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>, SchedulingError> {
        rule.validate()?;
        if first_end <= first_start {
            return Err(SchedulingError::Validation(
                "end time must be after start time".to_string(),
            ));
        }

        let duration = first_end - first_start;
        let mut occurrences = vec![Occurrence {
            start: first_start,
            end: first_end,
        }];

        match rule.frequency {
            Frequency::Daily => {
                let step = Duration::days(i64::from(rule.interval));
                let mut start = first_start + step;
                while !self.is_complete(rule, occurrences.len(), start) {
                    occurrences.push(Occurrence {
                        start,
                        end: start + duration,
                    });
                    start += step;
                }
            }
            Frequency::Weekly => {
                // An empty weekday set selects nothing beyond the anchor.
                if rule.weekdays.is_empty() {
                    return Ok(occurrences);
                }

                let anchor = first_start.naive_utc();
                let time_of_day = anchor.time();
                // Window the series into Sunday-anchored weeks, `interval`
                // weeks apart, and walk the weekday set ascending inside each.
                let week_anchor = anchor.date()
                    - Duration::days(i64::from(anchor.weekday().num_days_from_sunday()));
                let week_step = Duration::days(7 * i64::from(rule.interval));

                let mut week_start = week_anchor;
                'weeks: loop {
                    for &weekday in &rule.weekdays {
                        let date = week_start + Duration::days(i64::from(weekday));
                        let start = date.and_time(time_of_day).and_utc();
                        if start <= first_start {
                            continue;
                        }
                        if self.is_complete(rule, occurrences.len(), start) {
                            break 'weeks;
                        }
                        occurrences.push(Occurrence {
                            start,
                            end: start + duration,
                        });
                    }
                    week_start += week_step;
                }
            }
            Frequency::Monthly => {
                let mut cycle = 1u32;
                loop {
                    let months = Months::new(rule.interval.saturating_mul(cycle));
                    // Stepping from the anchor each cycle keeps the
                    // day-of-month stable (clamped in short months).
                    let Some(start) = first_start.checked_add_months(months) else {
                        break;
                    };
                    if self.is_complete(rule, occurrences.len(), start) {
                        break;
                    }
                    occurrences.push(Occurrence {
                        start,
                        end: start + duration,
                    });
                    cycle += 1;
                }
            }
        }

        Ok(occurrences)
    }

    fn is_complete(
        &self,
        rule: &RecurrenceRule,
        generated: usize,
        next_start: DateTime<Utc>,
    ) -> bool {
        match rule.end {
            RecurrenceEnd::Count(count) => generated >= count as usize,
            RecurrenceEnd::Until(until) => next_start > until,
            RecurrenceEnd::Never => generated >= self.occurrence_cap,
        }
    }
}
