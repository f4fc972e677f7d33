//! Attendance log lifecycle: `NONE -> OPEN -> CLOSED`, no reopening.
//!
//! The one-open-session rule is checked here for a friendly error and
//! enforced again by a unique index, so a lost race surfaces as the same
//! [`AppError::AlreadyCheckedIn`].

use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::error::{AppError, AppResult, is_unique_violation};
use crate::model::attendance::{AttendanceLog, AttendanceStatus, NewAttendanceLog};
use crate::services::location::{LocationClaim, LocationPolicy};
use crate::services::schedule::{self, ScheduleBounds, WorkBreakdown};

pub trait AttendanceRepository: Send + Sync {
    fn find_open(
        &self,
        user_id: u64,
    ) -> impl Future<Output = AppResult<Option<AttendanceLog>>> + Send;

    /// Fails with [`AppError::AlreadyCheckedIn`] if an open log already exists.
    fn insert_open(
        &self,
        log: NewAttendanceLog,
    ) -> impl Future<Output = AppResult<AttendanceLog>> + Send;

    /// Sets `check_out_time` on an open log, `None` if it was no longer open.
    fn close(
        &self,
        id: u64,
        check_out: DateTime<Utc>,
    ) -> impl Future<Output = AppResult<Option<AttendanceLog>>> + Send;
}

#[derive(Clone)]
pub struct MySqlAttendanceRepository {
    pool: MySqlPool,
}

impl MySqlAttendanceRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

pub const LOG_COLUMNS: &str = "id, user_id, work_date, check_in_time, check_out_time, status, \
     late_minutes, check_in_method, latitude, longitude, ip_address";

pub async fn fetch_log(pool: &MySqlPool, id: u64) -> AppResult<Option<AttendanceLog>> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM attendance_logs WHERE id = ?");
    Ok(sqlx::query_as::<_, AttendanceLog>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

impl AttendanceRepository for MySqlAttendanceRepository {
    async fn find_open(&self, user_id: u64) -> AppResult<Option<AttendanceLog>> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM attendance_logs \
             WHERE user_id = ? AND check_out_time IS NULL \
             ORDER BY check_in_time DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, AttendanceLog>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_open(&self, log: NewAttendanceLog) -> AppResult<AttendanceLog> {
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_logs
                (user_id, work_date, check_in_time, status, late_minutes,
                 check_in_method, latitude, longitude, ip_address)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(log.user_id)
        .bind(log.work_date)
        .bind(log.check_in_time)
        .bind(log.status.as_ref())
        .bind(log.late_minutes)
        .bind(&log.check_in_method)
        .bind(log.latitude)
        .bind(log.longitude)
        .bind(&log.ip_address)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_id(),
            Err(e) if is_unique_violation(&e) => return Err(AppError::AlreadyCheckedIn),
            Err(e) => return Err(e.into()),
        };

        fetch_log(&self.pool, id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("attendance log {id} vanished after insert")))
    }

    async fn close(&self, id: u64, check_out: DateTime<Utc>) -> AppResult<Option<AttendanceLog>> {
        let result = sqlx::query(
            r#"
            UPDATE attendance_logs
            SET check_out_time = ?
            WHERE id = ?
            AND check_out_time IS NULL
            "#,
        )
        .bind(check_out)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        fetch_log(&self.pool, id).await
    }
}

/// Everything check-in needs besides the repository.
pub struct CheckInContext<'a> {
    pub user_id: u64,
    pub now: DateTime<Utc>,
    pub bounds: &'a ScheduleBounds,
    pub late_grace_minutes: i64,
    pub policy: &'a LocationPolicy,
    pub claim: LocationClaim,
}

pub async fn check_in<R: AttendanceRepository>(
    repo: &R,
    ctx: CheckInContext<'_>,
) -> AppResult<AttendanceLog> {
    ctx.policy.verify(&ctx.claim)?;

    if let Some(open) = repo.find_open(ctx.user_id).await? {
        warn!(user_id = ctx.user_id, open_log = open.id, "Check-in rejected, session already open");
        return Err(AppError::AlreadyCheckedIn);
    }

    let late = schedule::late_minutes(ctx.now, ctx.bounds, ctx.late_grace_minutes);
    let status = if late > 0 {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Present
    };

    let log = repo
        .insert_open(NewAttendanceLog {
            user_id: ctx.user_id,
            work_date: ctx.bounds.local_date(ctx.now),
            check_in_time: ctx.now,
            status,
            late_minutes: late.min(i32::MAX as i64) as i32,
            check_in_method: ctx.claim.method.to_string(),
            latitude: ctx.claim.latitude,
            longitude: ctx.claim.longitude,
            ip_address: ctx.claim.ip.map(|ip| ip.to_string()),
        })
        .await?;

    info!(user_id = ctx.user_id, log_id = log.id, status = %status, late_minutes = late, "Checked in");
    Ok(log)
}

pub async fn check_out<R: AttendanceRepository>(
    repo: &R,
    user_id: u64,
    now: DateTime<Utc>,
    bounds: &ScheduleBounds,
) -> AppResult<(AttendanceLog, WorkBreakdown)> {
    let open = repo
        .find_open(user_id)
        .await?
        .ok_or(AppError::NoOpenSession)?;

    if now < open.check_in_time {
        return Err(AppError::validation("Check-out cannot precede check-in"));
    }

    let closed = repo
        .close(open.id, now)
        .await?
        .ok_or(AppError::NoOpenSession)?;

    let breakdown = schedule::calculate(closed.check_in_time, closed.check_out_time, bounds);
    info!(
        user_id,
        log_id = closed.id,
        standard = breakdown.standard_minutes,
        overtime = breakdown.overtime_minutes,
        "Checked out"
    );

    Ok((closed, breakdown))
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::Mutex;

    /// In-process repository with the same open-session guarantee as the
    /// unique index.
    #[derive(Default)]
    pub struct InMemoryAttendanceRepository {
        logs: Mutex<Vec<AttendanceLog>>,
    }

    impl InMemoryAttendanceRepository {
        pub fn rows(&self) -> Vec<AttendanceLog> {
            self.logs.lock().unwrap().clone()
        }
    }

    impl AttendanceRepository for InMemoryAttendanceRepository {
        async fn find_open(&self, user_id: u64) -> AppResult<Option<AttendanceLog>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.user_id == user_id && l.is_open())
                .cloned())
        }

        async fn insert_open(&self, log: NewAttendanceLog) -> AppResult<AttendanceLog> {
            let mut logs = self.logs.lock().unwrap();
            if logs.iter().any(|l| l.user_id == log.user_id && l.is_open()) {
                return Err(AppError::AlreadyCheckedIn);
            }
            let row = AttendanceLog {
                id: logs.len() as u64 + 1,
                user_id: log.user_id,
                work_date: log.work_date,
                check_in_time: log.check_in_time,
                check_out_time: None,
                status: log.status.to_string(),
                late_minutes: log.late_minutes,
                check_in_method: log.check_in_method,
                latitude: log.latitude,
                longitude: log.longitude,
                ip_address: log.ip_address,
            };
            logs.push(row.clone());
            Ok(row)
        }

        async fn close(&self, id: u64, check_out: DateTime<Utc>) -> AppResult<Option<AttendanceLog>> {
            let mut logs = self.logs.lock().unwrap();
            match logs.iter_mut().find(|l| l.id == id && l.is_open()) {
                Some(log) => {
                    log.check_out_time = Some(check_out);
                    Ok(Some(log.clone()))
                }
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryAttendanceRepository;
    use super::*;
    use chrono::NaiveDate;
    use crate::services::location::CheckInMethod;
    use crate::services::schedule::parse_wall_clock;

    fn bounds() -> ScheduleBounds {
        ScheduleBounds::parse("08:30", "12:00", "13:30", "17:30", 420).unwrap()
    }

    fn policy() -> LocationPolicy {
        LocationPolicy {
            office_latitude: Some(10.7769),
            office_longitude: Some(106.7009),
            radius_meters: 200.0,
            wifi_allowlist: vec!["192.168.10.0/24".into()],
        }
    }

    fn at(hh_mm: &str) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        bounds().instant_at(date, parse_wall_clock(hh_mm).unwrap())
    }

    fn office_wifi() -> LocationClaim {
        LocationClaim {
            method: CheckInMethod::Wifi,
            latitude: None,
            longitude: None,
            ip: Some("192.168.10.20".parse().unwrap()),
        }
    }

    async fn check_in_at<'a>(
        repo: &InMemoryAttendanceRepository,
        user_id: u64,
        hh_mm: &str,
        bounds: &'a ScheduleBounds,
        policy: &'a LocationPolicy,
        claim: LocationClaim,
    ) -> AppResult<AttendanceLog> {
        check_in(
            repo,
            CheckInContext {
                user_id,
                now: at(hh_mm),
                bounds,
                late_grace_minutes: 5,
                policy,
                claim,
            },
        )
        .await
    }

    #[actix_web::test]
    async fn open_then_close() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        let log = check_in_at(&repo, 1, "08:30", &b, &p, office_wifi()).await.unwrap();
        assert!(log.is_open());
        assert_eq!(log.status, "present");
        assert_eq!(log.work_date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());

        let (closed, breakdown) = check_out(&repo, 1, at("19:00"), &b).await.unwrap();
        assert!(!closed.is_open());
        assert_eq!(breakdown.standard_minutes, 450);
        assert_eq!(breakdown.break_minutes, 90);
        assert_eq!(breakdown.overtime_minutes, 90);
    }

    #[actix_web::test]
    async fn double_check_in_is_rejected_without_a_second_row() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        check_in_at(&repo, 1, "08:30", &b, &p, office_wifi()).await.unwrap();
        let err = check_in_at(&repo, 1, "09:00", &b, &p, office_wifi())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyCheckedIn));
        assert_eq!(repo.rows().len(), 1);
    }

    #[actix_web::test]
    async fn other_users_are_independent() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        check_in_at(&repo, 1, "08:30", &b, &p, office_wifi()).await.unwrap();
        check_in_at(&repo, 2, "08:30", &b, &p, office_wifi()).await.unwrap();
        assert_eq!(repo.rows().len(), 2);
    }

    #[actix_web::test]
    async fn check_out_without_open_session_is_rejected() {
        let repo = InMemoryAttendanceRepository::default();
        let b = bounds();

        let err = check_out(&repo, 1, at("17:30"), &b).await.unwrap_err();
        assert!(matches!(err, AppError::NoOpenSession));
    }

    #[actix_web::test]
    async fn closed_session_cannot_be_closed_again() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        check_in_at(&repo, 1, "08:30", &b, &p, office_wifi()).await.unwrap();
        check_out(&repo, 1, at("17:30"), &b).await.unwrap();

        let err = check_out(&repo, 1, at("18:00"), &b).await.unwrap_err();
        assert!(matches!(err, AppError::NoOpenSession));

        // A new session may start after the previous one closed.
        check_in_at(&repo, 1, "18:30", &b, &p, office_wifi()).await.unwrap();
        assert_eq!(repo.rows().len(), 2);
    }

    #[actix_web::test]
    async fn late_arrival_is_marked() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        let log = check_in_at(&repo, 1, "09:10", &b, &p, office_wifi()).await.unwrap();
        assert_eq!(log.status, "late");
        assert_eq!(log.late_minutes, 40);
    }

    #[actix_web::test]
    async fn rejected_location_writes_nothing() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());
        let outside = LocationClaim {
            ip: Some("10.1.1.1".parse().unwrap()),
            ..office_wifi()
        };

        let err = check_in_at(&repo, 1, "08:30", &b, &p, outside).await.unwrap_err();
        assert!(matches!(err, AppError::LocationRejected(_)));
        assert!(repo.rows().is_empty());
    }

    #[actix_web::test]
    async fn open_session_breakdown_is_zero() {
        let repo = InMemoryAttendanceRepository::default();
        let (b, p) = (bounds(), policy());

        let log = check_in_at(&repo, 1, "08:30", &b, &p, office_wifi()).await.unwrap();
        let breakdown = schedule::calculate(log.check_in_time, log.check_out_time, &b);
        assert_eq!(breakdown, WorkBreakdown::default());
    }
}
