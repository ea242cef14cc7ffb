//! Cron schedule evaluation.
//!
//! The orchestrator fires the workflow; this module answers when it would,
//! so that cadence, start date and catch-up behaviour can be checked offline.

use chrono::{DateTime, Days, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;
use croner::Cron;

use super::types::{StartDate, WorkflowDefinition};
use crate::error::{Error, Result};

/// Upper bound on firings enumerated in one call.
const MAX_FIRE_TIMES: usize = 10_000;

/// A parsed cron expression bound to a timezone.
pub struct CronSchedule {
    expression: String,
    timezone: CronTimezone,
    cron: Cron,
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronSchedule")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CronTimezone {
    Utc,
    FixedOffset(FixedOffset),
    Named(Tz),
}

impl CronSchedule {
    /// Parse a five-field cron expression, evaluated in `timezone` (UTC if `None`).
    pub fn parse(expression: &str, timezone: Option<&str>) -> Result<Self> {
        let cron = Cron::new(expression.trim()).parse().map_err(|e| {
            Error::Schedule(format!("Invalid cron expression '{}': {}", expression, e))
        })?;

        let timezone = match timezone {
            Some(raw) => parse_timezone(raw)?,
            None => CronTimezone::Utc,
        };

        Ok(Self {
            expression: expression.trim().to_string(),
            timezone,
            cron,
        })
    }

    /// Schedule of a workflow definition.
    pub fn for_workflow(workflow: &WorkflowDefinition) -> Result<Self> {
        Self::parse(&workflow.schedule, workflow.timezone.as_deref())
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First firing strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.find(after, false)
    }

    /// First firing at or after `at`.
    pub fn next_from(&self, at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        self.find(at, true)
    }

    /// The next `count` firings strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Result<Vec<DateTime<Utc>>> {
        let mut times = Vec::with_capacity(count.min(MAX_FIRE_TIMES));
        let mut cursor = after;
        for _ in 0..count.min(MAX_FIRE_TIMES) {
            cursor = self.next_after(cursor)?;
            times.push(cursor);
        }
        Ok(times)
    }

    /// All firings in `[from, to]`.
    pub fn fire_times_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let mut times = Vec::new();
        if from > to {
            return Ok(times);
        }

        let mut cursor = self.next_from(from)?;
        while cursor <= to {
            if times.len() >= MAX_FIRE_TIMES {
                return Err(Error::Schedule(format!(
                    "More than {} firings between {} and {}",
                    MAX_FIRE_TIMES, from, to
                )));
            }
            times.push(cursor);
            cursor = self.next_after(cursor)?;
        }
        Ok(times)
    }

    /// Whether the schedule fires exactly at `at`.
    pub fn fires_at(&self, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.next_from(at)? == at)
    }

    fn find(&self, at: DateTime<Utc>, inclusive: bool) -> Result<DateTime<Utc>> {
        match self.timezone {
            CronTimezone::Utc => next_in(&self.cron, at, &Utc, inclusive),
            CronTimezone::FixedOffset(offset) => next_in(&self.cron, at, &offset, inclusive),
            CronTimezone::Named(tz) => next_in(&self.cron, at, &tz, inclusive),
        }
        .map_err(|e| {
            Error::Schedule(format!(
                "No firing of '{}' found after {}: {}",
                self.expression, at, e
            ))
        })
    }
}

fn next_in<Z: TimeZone>(
    cron: &Cron,
    at: DateTime<Utc>,
    timezone: &Z,
    inclusive: bool,
) -> std::result::Result<DateTime<Utc>, croner::errors::CronError> {
    let local = at.with_timezone(timezone);
    cron.find_next_occurrence(&local, inclusive)
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_timezone(raw: &str) -> Result<CronTimezone> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") {
        return Ok(CronTimezone::Utc);
    }

    if let Ok(tz) = trimmed.parse::<Tz>() {
        return Ok(CronTimezone::Named(tz));
    }

    if let Some(offset) = parse_fixed_offset(trimmed) {
        return Ok(CronTimezone::FixedOffset(offset));
    }

    Err(Error::Schedule(format!(
        "Invalid timezone '{}'. Use IANA name (e.g. 'Asia/Ho_Chi_Minh') or UTC offset (e.g. '+07:00')",
        raw
    )))
}

fn parse_fixed_offset(raw: &str) -> Option<FixedOffset> {
    let sign = if raw.starts_with('+') {
        1
    } else if raw.starts_with('-') {
        -1
    } else {
        return None;
    };

    let tz = &raw[1..];
    let (hours, minutes) = if let Some((h, m)) = tz.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if tz.len() == 4 {
        (tz.get(0..2)?.parse::<i32>().ok()?, tz.get(2..4)?.parse::<i32>().ok()?)
    } else {
        return None;
    };

    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Resolve a start date against the activation instant.
///
/// Relative start dates count whole days back from UTC midnight of the
/// activation day.
pub fn resolve_start_date(start: &StartDate, activation: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match start {
        StartDate::Absolute(dt) => Ok(*dt),
        StartDate::Relative { days_ago } => activation
            .date_naive()
            .checked_sub_days(Days::new(u64::from(*days_ago)))
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc())
            .ok_or_else(|| {
                Error::Schedule(format!(
                    "Start date {} days before {} is out of range",
                    days_ago, activation
                ))
            }),
    }
}

/// When a registered workflow is due to run.
#[derive(Debug)]
pub struct SchedulePlan {
    schedule: CronSchedule,
    start: DateTime<Utc>,
    activation: DateTime<Utc>,
    catchup: bool,
}

impl SchedulePlan {
    /// Plan for `workflow` registered at `activation`.
    pub fn new(workflow: &WorkflowDefinition, activation: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            schedule: CronSchedule::for_workflow(workflow)?,
            start: resolve_start_date(&workflow.start_date, activation)?,
            activation,
            catchup: workflow.catchup,
        })
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn activation(&self) -> DateTime<Utc> {
        self.activation
    }

    /// Earliest instant a run may be created for.
    ///
    /// Without catch-up, firings between the start date and activation are
    /// skipped entirely.
    pub fn window_start(&self) -> DateTime<Utc> {
        if self.catchup {
            self.start
        } else {
            self.start.max(self.activation)
        }
    }

    /// Logical dates of every run due by `now`.
    pub fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        self.schedule.fire_times_between(self.window_start(), now)
    }

    /// The next run the plan allows after `after`.
    ///
    /// A firing exactly at the window start counts, matching [`due_runs`].
    ///
    /// [`due_runs`]: SchedulePlan::due_runs
    pub fn next_run(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let window_start = self.window_start();
        if after <= window_start {
            self.schedule.next_from(window_start)
        } else {
            self.schedule.next_after(after)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_twice_daily_fires_at_six_and_eighteen() {
        let schedule = CronSchedule::parse("0 6,18 * * *", None).unwrap();
        let times = schedule
            .upcoming(utc("2026-10-19T07:00:00Z"), 4)
            .unwrap();

        assert_eq!(
            times,
            vec![
                utc("2026-10-19T18:00:00Z"),
                utc("2026-10-20T06:00:00Z"),
                utc("2026-10-20T18:00:00Z"),
                utc("2026-10-21T06:00:00Z"),
            ]
        );
        for t in &times {
            assert!(t.hour() == 6 || t.hour() == 18);
            assert_eq!(t.minute(), 0);
        }
    }

    #[test]
    fn test_fires_at() {
        let schedule = CronSchedule::parse("0 6,18 * * *", Some("UTC")).unwrap();
        assert!(schedule.fires_at(utc("2026-10-19T06:00:00Z")).unwrap());
        assert!(schedule.fires_at(utc("2026-10-19T18:00:00Z")).unwrap());
        assert!(!schedule.fires_at(utc("2026-10-19T12:00:00Z")).unwrap());
    }

    #[test]
    fn test_fire_times_between_inclusive() {
        let schedule = CronSchedule::parse("0 6,18 * * *", None).unwrap();
        let times = schedule
            .fire_times_between(utc("2026-10-18T06:00:00Z"), utc("2026-10-19T06:00:00Z"))
            .unwrap();
        assert_eq!(times.len(), 3);

        let none = schedule
            .fire_times_between(utc("2026-10-19T07:00:00Z"), utc("2026-10-19T06:00:00Z"))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_named_timezone_shifts_firings() {
        let schedule = CronSchedule::parse("0 6 * * *", Some("Asia/Ho_Chi_Minh")).unwrap();
        let next = schedule.next_after(utc("2026-10-19T00:00:00Z")).unwrap();
        // 06:00 at UTC+7
        assert_eq!(next, utc("2026-10-19T23:00:00Z"));
    }

    #[test]
    fn test_fixed_offset_timezone() {
        let schedule = CronSchedule::parse("0 6 * * *", Some("+08:00")).unwrap();
        let next = schedule.next_after(utc("2026-10-19T00:00:00Z")).unwrap();
        assert_eq!(next, utc("2026-10-19T22:00:00Z"));
    }

    #[test]
    fn test_invalid_expression_and_timezone() {
        assert!(CronSchedule::parse("not a cron", None).is_err());
        assert!(CronSchedule::parse("0 25 * * *", None).is_err());
        let err = CronSchedule::parse("0 6 * * *", Some("Mars/Olympus")).unwrap_err();
        assert_eq!(err.code(), "SCHEDULE_ERROR");
    }

    #[test]
    fn test_parse_fixed_offset_rejects_out_of_range() {
        assert!(parse_fixed_offset("+25:00").is_none());
        assert!(parse_fixed_offset("+10:99").is_none());
        assert!(parse_fixed_offset("-0530").is_some());
    }

    #[test]
    fn test_multibyte_offset_is_an_error() {
        assert!(parse_fixed_offset("+1é1").is_none());
        assert!(parse_fixed_offset("-é").is_none());

        let err = CronSchedule::parse("0 6 * * *", Some("+1é1")).unwrap_err();
        assert_eq!(err.code(), "SCHEDULE_ERROR");
    }

    #[test]
    fn test_resolve_relative_start_date() {
        let start = resolve_start_date(
            &StartDate::Relative { days_ago: 1 },
            utc("2026-10-19T12:34:56Z"),
        )
        .unwrap();
        assert_eq!(start, utc("2026-10-18T00:00:00Z"));
    }

    fn workflow(catchup: bool) -> WorkflowDefinition {
        let yaml = format!(
            r#"
name: sched
schedule: "0 6,18 * * *"
start_date:
  days_ago: 1
catchup: {}
steps:
  - id: a
    name: a
    image: busybox
    command: [echo, ok]
"#,
            catchup
        );
        crate::workflow::parse_workflow(&yaml).unwrap()
    }

    #[test]
    fn test_no_backfill_without_catchup() {
        let activation = utc("2026-10-19T12:00:00Z");
        let plan = SchedulePlan::new(&workflow(false), activation).unwrap();

        assert_eq!(plan.start(), utc("2026-10-18T00:00:00Z"));
        assert!(plan.due_runs(activation).unwrap().is_empty());
        assert_eq!(
            plan.due_runs(utc("2026-10-19T20:00:00Z")).unwrap(),
            vec![utc("2026-10-19T18:00:00Z")]
        );
        assert_eq!(
            plan.next_run(utc("2026-10-18T00:00:00Z")).unwrap(),
            utc("2026-10-19T18:00:00Z")
        );
    }

    #[test]
    fn test_backfill_with_catchup() {
        let activation = utc("2026-10-19T12:00:00Z");
        let plan = SchedulePlan::new(&workflow(true), activation).unwrap();

        assert_eq!(
            plan.due_runs(activation).unwrap(),
            vec![
                utc("2026-10-18T06:00:00Z"),
                utc("2026-10-18T18:00:00Z"),
                utc("2026-10-19T06:00:00Z"),
            ]
        );
    }

    #[test]
    fn test_activation_on_a_firing_is_due_and_next() {
        let activation = utc("2026-10-19T06:00:00Z");
        let plan = SchedulePlan::new(&workflow(false), activation).unwrap();

        assert_eq!(plan.due_runs(activation).unwrap(), vec![activation]);
        assert_eq!(plan.next_run(activation).unwrap(), activation);
        assert_eq!(
            plan.next_run(utc("2026-10-19T06:00:01Z")).unwrap(),
            utc("2026-10-19T18:00:00Z")
        );
    }
}
