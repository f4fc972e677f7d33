//! Statistics and CSV export over attendance logs. Both read minutes from
//! [`schedule::calculate`] with the bounds in force on each log's work date.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::attendance::{AttendanceLog, AttendanceStatus};
use crate::services::schedule::{self, ScheduleBounds, WorkBreakdown};
use crate::services::settings::{apply_override, load_overrides};

/// Per-date schedule overrides of one user.
pub type OverrideMap = HashMap<NaiveDate, (NaiveTime, NaiveTime)>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    #[schema(example = 42)]
    pub user_id: u64,
    #[schema(example = "2026-10")]
    pub month: String,
    pub days_present: u32,
    pub days_late: u32,
    pub days_leave: u32,
    pub total_late_minutes: i64,
    pub standard_minutes: i64,
    pub overtime_minutes: i64,
    pub break_minutes: i64,
    pub approved_leave_hours: f64,
}

/// Parses `YYYY-MM` into the first and last day of that month.
pub fn month_range(month: &str) -> AppResult<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid month '{month}', use YYYY-MM")))?;

    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .ok_or_else(|| AppError::validation("Month out of range"))?;

    Ok((first, next.pred_opt().unwrap_or(first)))
}

/// Overrides of every user appearing in `logs`, over the logs' date span.
pub async fn load_override_maps(
    pool: &MySqlPool,
    logs: &[AttendanceLog],
) -> AppResult<HashMap<u64, OverrideMap>> {
    let mut spans: HashMap<u64, (NaiveDate, NaiveDate)> = HashMap::new();
    for log in logs {
        let span = spans.entry(log.user_id).or_insert((log.work_date, log.work_date));
        span.0 = span.0.min(log.work_date);
        span.1 = span.1.max(log.work_date);
    }

    let mut maps = HashMap::with_capacity(spans.len());
    for (user_id, (from, to)) in spans {
        let rows = load_overrides(pool, user_id, from, to).await?;
        maps.insert(
            user_id,
            rows.into_iter().map(|(date, start, end)| (date, (start, end))).collect(),
        );
    }
    Ok(maps)
}

pub fn breakdown_for(
    log: &AttendanceLog,
    base: &ScheduleBounds,
    overrides: &OverrideMap,
) -> WorkBreakdown {
    let bounds = apply_override(base, overrides.get(&log.work_date).copied());
    schedule::calculate(log.check_in_time, log.check_out_time, &bounds)
}

pub fn summarize(
    user_id: u64,
    month: &str,
    logs: &[AttendanceLog],
    base: &ScheduleBounds,
    overrides: &OverrideMap,
    approved_leave_hours: f64,
) -> AttendanceSummary {
    let mut totals = WorkBreakdown::default();
    let mut present_days = HashSet::new();
    let mut late_days = HashSet::new();
    let mut leave_days = HashSet::new();
    let mut total_late_minutes = 0i64;

    for log in logs {
        match log.status.parse::<AttendanceStatus>() {
            Ok(AttendanceStatus::Leave) => {
                leave_days.insert(log.work_date);
                continue;
            }
            Ok(AttendanceStatus::Late) => {
                late_days.insert(log.work_date);
                total_late_minutes += log.late_minutes as i64;
            }
            Ok(AttendanceStatus::Present) => {}
            Err(_) => {
                tracing::warn!(log_id = log.id, status = %log.status, "Unknown attendance status");
            }
        }

        present_days.insert(log.work_date);
        totals += breakdown_for(log, base, overrides);
    }

    AttendanceSummary {
        user_id,
        month: month.to_string(),
        days_present: present_days.len() as u32,
        days_late: late_days.len() as u32,
        days_leave: leave_days.len() as u32,
        total_late_minutes,
        standard_minutes: totals.standard_minutes,
        overtime_minutes: totals.overtime_minutes,
        break_minutes: totals.break_minutes,
        approved_leave_hours,
    }
}

#[derive(Serialize)]
struct ExportRow<'a> {
    user_id: u64,
    work_date: NaiveDate,
    check_in_time: String,
    check_out_time: String,
    status: &'a str,
    late_minutes: i32,
    check_in_method: &'a str,
    standard_minutes: i64,
    overtime_minutes: i64,
    break_minutes: i64,
}

/// Renders logs as CSV. `bounds_of` yields base bounds and overrides for a user.
pub fn export_csv<'a, F>(logs: &[AttendanceLog], mut bounds_of: F) -> AppResult<Vec<u8>>
where
    F: FnMut(u64) -> (&'a ScheduleBounds, &'a OverrideMap),
{
    let mut writer = csv::Writer::from_writer(Vec::new());

    for log in logs {
        let (base, overrides) = bounds_of(log.user_id);
        let breakdown = breakdown_for(log, base, overrides);
        let local = |t: chrono::DateTime<chrono::Utc>| {
            t.with_timezone(&base.offset).format("%Y-%m-%d %H:%M").to_string()
        };

        writer
            .serialize(ExportRow {
                user_id: log.user_id,
                work_date: log.work_date,
                check_in_time: local(log.check_in_time),
                check_out_time: log.check_out_time.map(local).unwrap_or_default(),
                status: &log.status,
                late_minutes: log.late_minutes,
                check_in_method: &log.check_in_method,
                standard_minutes: breakdown.standard_minutes,
                overtime_minutes: breakdown.overtime_minutes,
                break_minutes: breakdown.break_minutes,
            })
            .map_err(|e| AppError::Internal(format!("CSV write failed: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schedule::parse_wall_clock;

    fn bounds() -> ScheduleBounds {
        ScheduleBounds::parse("08:30", "12:00", "13:30", "17:30", 420).unwrap()
    }

    fn log(id: u64, day: u32, start: &str, end: Option<&str>, status: &str, late: i32) -> AttendanceLog {
        let b = bounds();
        let date = NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
        AttendanceLog {
            id,
            user_id: 7,
            work_date: date,
            check_in_time: b.instant_at(date, parse_wall_clock(start).unwrap()),
            check_out_time: end.map(|e| b.instant_at(date, parse_wall_clock(e).unwrap())),
            status: status.into(),
            late_minutes: late,
            check_in_method: "wifi".into(),
            latitude: None,
            longitude: None,
            ip_address: None,
        }
    }

    #[test]
    fn month_range_handles_december() {
        let (first, last) = month_range("2026-12").unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        let (_, last) = month_range("2028-02").unwrap();
        assert_eq!(last.day(), 29);
        assert!(month_range("2026-13").is_err());
        assert!(month_range("October").is_err());
    }

    #[test]
    fn summary_totals() {
        let logs = vec![
            log(1, 19, "08:30", Some("19:00"), "present", 0),
            log(2, 20, "09:00", Some("17:30"), "late", 30),
            log(3, 21, "08:30", Some("08:30"), "leave", 0),
            log(4, 22, "08:30", None, "present", 0),
        ];

        let summary = summarize(7, "2026-10", &logs, &bounds(), &OverrideMap::new(), 7.5);

        assert_eq!(summary.days_present, 3);
        assert_eq!(summary.days_late, 1);
        assert_eq!(summary.days_leave, 1);
        assert_eq!(summary.total_late_minutes, 30);
        // 450 + (180 + 240), open session adds nothing
        assert_eq!(summary.standard_minutes, 450 + 420);
        assert_eq!(summary.overtime_minutes, 90);
        assert_eq!(summary.break_minutes, 180);
        assert_eq!(summary.approved_leave_hours, 7.5);
    }

    #[test]
    fn overrides_shift_the_standard_window() {
        let logs = vec![log(1, 19, "10:00", Some("19:00"), "present", 0)];
        let overrides = OverrideMap::from([(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            (parse_wall_clock("10:00").unwrap(), parse_wall_clock("19:00").unwrap()),
        )]);

        let plain = summarize(7, "2026-10", &logs, &bounds(), &OverrideMap::new(), 0.0);
        let shifted = summarize(7, "2026-10", &logs, &bounds(), &overrides, 0.0);

        assert_eq!(plain.overtime_minutes, 90);
        assert_eq!(shifted.overtime_minutes, 0);
        assert_eq!(shifted.standard_minutes, 120 + 330);
    }

    #[test]
    fn csv_export_has_header_and_minutes() {
        let b = bounds();
        let overrides = OverrideMap::new();
        let logs = vec![
            log(1, 19, "08:30", Some("19:00"), "present", 0),
            log(2, 20, "08:30", None, "present", 0),
        ];

        let bytes = export_csv(&logs, |_| (&b, &overrides)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("user_id,work_date,check_in_time"));
        assert_eq!(
            lines[1],
            "7,2026-10-19,2026-10-19 08:30,2026-10-19 19:00,present,0,wifi,450,90,90"
        );
        assert_eq!(lines[2], "7,2026-10-20,2026-10-20 08:30,,present,0,wifi,0,0,0");
    }
}
