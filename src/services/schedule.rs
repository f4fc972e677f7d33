//! Attendance window calculator.
//!
//! Every consumer that needs standard/overtime/break minutes for one
//! attendance record goes through [`calculate`] with an explicit
//! [`ScheduleBounds`] value.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Configured work day, as local wall-clock times in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleBounds {
    pub work_start: NaiveTime,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    pub work_end: NaiveTime,
    pub offset: FixedOffset,
}

/// Minutes worked for one attendance record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct WorkBreakdown {
    #[schema(example = 450)]
    pub standard_minutes: i64,
    #[schema(example = 90)]
    pub overtime_minutes: i64,
    #[schema(example = 90)]
    pub break_minutes: i64,
}

impl std::ops::AddAssign for WorkBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        self.standard_minutes += rhs.standard_minutes;
        self.overtime_minutes += rhs.overtime_minutes;
        self.break_minutes += rhs.break_minutes;
    }
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_wall_clock(value: &str) -> AppResult<NaiveTime> {
    let value = value.trim();

    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| AppError::validation(format!("Invalid time '{value}', use HH:MM")))
}

pub fn offset_from_minutes(minutes: i32) -> AppResult<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| AppError::validation(format!("Invalid UTC offset: {minutes} minutes")))
}

impl ScheduleBounds {
    pub fn new(
        work_start: NaiveTime,
        lunch_start: NaiveTime,
        lunch_end: NaiveTime,
        work_end: NaiveTime,
        offset: FixedOffset,
    ) -> AppResult<Self> {
        if !(work_start < lunch_start && lunch_start <= lunch_end && lunch_end < work_end) {
            return Err(AppError::validation(
                "Schedule must satisfy work_start < lunch_start <= lunch_end < work_end",
            ));
        }

        Ok(Self {
            work_start,
            lunch_start,
            lunch_end,
            work_end,
            offset,
        })
    }

    pub fn parse(
        work_start: &str,
        lunch_start: &str,
        lunch_end: &str,
        work_end: &str,
        utc_offset_minutes: i32,
    ) -> AppResult<Self> {
        Self::new(
            parse_wall_clock(work_start)?,
            parse_wall_clock(lunch_start)?,
            parse_wall_clock(lunch_end)?,
            parse_wall_clock(work_end)?,
            offset_from_minutes(utc_offset_minutes)?,
        )
    }

    /// Same lunch window, different start and end of day.
    pub fn with_override(&self, work_start: NaiveTime, work_end: NaiveTime) -> AppResult<Self> {
        Self::new(
            work_start,
            self.lunch_start,
            self.lunch_end,
            work_end,
            self.offset,
        )
    }

    /// Length of the morning plus afternoon windows.
    pub fn standard_day_minutes(&self) -> i64 {
        (self.lunch_start - self.work_start).num_minutes()
            + (self.work_end - self.lunch_end).num_minutes()
    }

    /// Calendar date of `instant` in the organisational offset.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Absolute instant of a wall-clock time on a local date.
    pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let utc = date.and_time(time) - Duration::seconds(self.offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&utc)
    }
}

fn overlap_seconds(
    a: DateTime<Utc>,
    b: DateTime<Utc>,
    c: DateTime<Utc>,
    d: DateTime<Utc>,
) -> i64 {
    let start = a.max(c);
    let end = b.min(d);
    (end - start).num_seconds().max(0)
}

/// Standard, overtime and lunch-overlap minutes for one record.
///
/// An open session (`check_out == None`) yields all zeros. Boundaries are
/// projected onto the local date of `check_in`; sessions crossing midnight
/// are not supported.
pub fn calculate(
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
    bounds: &ScheduleBounds,
) -> WorkBreakdown {
    let Some(check_out) = check_out else {
        return WorkBreakdown::default();
    };

    if check_out <= check_in {
        return WorkBreakdown::default();
    }

    let date = bounds.local_date(check_in);
    let morning_start = bounds.instant_at(date, bounds.work_start);
    let lunch_start = bounds.instant_at(date, bounds.lunch_start);
    let lunch_end = bounds.instant_at(date, bounds.lunch_end);
    let work_end = bounds.instant_at(date, bounds.work_end);

    // Seconds throughout; minutes are floored once so partial minutes never
    // leak from the standard windows into overtime.
    let standard = overlap_seconds(check_in, check_out, morning_start, lunch_start)
        + overlap_seconds(check_in, check_out, lunch_end, work_end);
    let lunch = overlap_seconds(check_in, check_out, lunch_start, lunch_end);

    let worked = ((check_out - check_in).num_seconds() - lunch).max(0);
    let overtime = (worked - standard).max(0);

    WorkBreakdown {
        standard_minutes: standard / 60,
        overtime_minutes: overtime / 60,
        break_minutes: lunch / 60,
    }
}

/// Minutes after `work_start` at check-in; zero inside the grace period.
pub fn late_minutes(check_in: DateTime<Utc>, bounds: &ScheduleBounds, grace_minutes: i64) -> i64 {
    let date = bounds.local_date(check_in);
    let start = bounds.instant_at(date, bounds.work_start);
    let late = (check_in - start).num_minutes();

    if late > grace_minutes.max(0) { late } else { 0 }
}
