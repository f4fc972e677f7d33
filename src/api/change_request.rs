use crate::api::profile::display_name;
use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::model::attendance::{AttendanceLog, AttendanceStatus};
use crate::model::change_request::{ChangePayload, ChangeRequest, ChangeRequestRow};
use crate::model::leave_request::RequestStatus;
use crate::models::Pagination;
use crate::services::attendance::{LOG_COLUMNS, fetch_log};
use crate::services::email::{EmailService, Variables};
use crate::services::schedule::{self, ScheduleBounds, parse_wall_clock};
use crate::services::settings::SettingsService;
use crate::utils::db_utils::QueryFilter;
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool, Transaction};
use utoipa::{IntoParams, ToSchema};

const REQUEST_COLUMNS: &str =
    "id, user_id, kind, payload, reason, status, reviewer_id, reviewer_note, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChangeRequest {
    pub payload: ChangePayload,
    #[schema(example = "Forgot to check out")]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReviewNote {
    #[schema(example = "Confirmed with the team lead")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ChangeRequestFilter {
    pub user_id: Option<u64>,
    pub status: Option<RequestStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct ChangeRequestListResponse {
    pub data: Vec<ChangeRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

async fn fetch_request(pool: &MySqlPool, id: u64) -> AppResult<ChangeRequest> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM change_requests WHERE id = ?");
    sqlx::query_as::<_, ChangeRequestRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(ChangeRequest::from)
        .ok_or_else(|| AppError::not_found("Change request not found"))
}

/// Checks a payload against the data it would modify. `log` is the target
/// of an attendance edit, `bounds` the requester's company bounds.
fn validate_payload(
    payload: &ChangePayload,
    requester: u64,
    log: Option<&AttendanceLog>,
    bounds: &ScheduleBounds,
) -> AppResult<()> {
    match payload {
        ChangePayload::AttendanceEdit {
            check_in_time,
            check_out_time,
            ..
        } => {
            let log = log
                .filter(|l| l.user_id == requester)
                .ok_or_else(|| AppError::not_found("Attendance log not found"))?;

            if bounds.local_date(*check_in_time) != log.work_date {
                return Err(AppError::validation("check_in_time must stay on the log's work date"));
            }
            if check_out_time.is_none() && !log.is_open() {
                return Err(AppError::validation("A closed session cannot be reopened"));
            }
            if let Some(out) = check_out_time {
                if out < check_in_time {
                    return Err(AppError::validation("check_out_time cannot precede check_in_time"));
                }
                if bounds.local_date(*out) != log.work_date {
                    return Err(AppError::validation("Sessions cannot cross midnight"));
                }
            }
            Ok(())
        }
        ChangePayload::ScheduleChange {
            work_start, work_end, ..
        } => {
            bounds.with_override(parse_wall_clock(work_start)?, parse_wall_clock(work_end)?)?;
            Ok(())
        }
    }
}

/// Status of an edited log: leave stays leave, otherwise lateness decides.
fn edited_status(current: &str, late_minutes: i64) -> AttendanceStatus {
    match current.parse::<AttendanceStatus>() {
        Ok(AttendanceStatus::Leave) => AttendanceStatus::Leave,
        _ if late_minutes > 0 => AttendanceStatus::Late,
        _ => AttendanceStatus::Present,
    }
}

#[utoipa::path(
    post,
    path = "/api/change-requests",
    request_body = CreateChangeRequest,
    responses(
        (status = 201, description = "Change request submitted", body = ChangeRequest),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Attendance log not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Change requests"
)]
pub async fn create_change_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    payload: web::Json<CreateChangeRequest>,
) -> AppResult<HttpResponse> {
    let body = payload.into_inner();
    let policy = settings.current().await?;

    let log = match &body.payload {
        ChangePayload::AttendanceEdit { attendance_id, .. } => {
            fetch_log(pool.get_ref(), *attendance_id).await?
        }
        ChangePayload::ScheduleChange { .. } => None,
    };
    validate_payload(&body.payload, auth.user_id, log.as_ref(), &policy.bounds)?;

    let result = sqlx::query(
        r#"
        INSERT INTO change_requests (user_id, kind, payload, reason, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(body.payload.kind())
    .bind(Json(&body.payload))
    .bind(&body.reason)
    .bind(RequestStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    let request = fetch_request(pool.get_ref(), result.last_insert_id()).await?;
    tracing::info!(request_id = request.id, user_id = auth.user_id, kind = %request.kind, "Change request submitted");

    Ok(HttpResponse::Created().json(request))
}

#[utoipa::path(
    get,
    path = "/api/change-requests",
    params(ChangeRequestFilter, Pagination),
    responses(
        (status = 200, description = "Paginated change requests", body = ChangeRequestListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Change requests"
)]
pub async fn list_change_requests(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ChangeRequestFilter>,
    paging: web::Query<Pagination>,
) -> AppResult<HttpResponse> {
    let user_id = auth.scope_user_filter(query.user_id, perm::CHANGE_REQUESTS_VIEW)?;
    let (page, per_page, offset) = paging.resolve();

    let mut filter = QueryFilter::new();
    filter
        .push("user_id = ?", user_id)
        .push("status = ?", query.status.map(|s| s.to_string()));

    let count_sql = format!("SELECT COUNT(*) FROM change_requests{}", filter.where_clause());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM change_requests{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        filter.where_clause()
    );
    let data = filter
        .bind_as(sqlx::query_as::<_, ChangeRequestRow>(&data_sql))
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(ChangeRequest::from)
        .collect();

    Ok(HttpResponse::Ok().json(ChangeRequestListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/change-requests/{request_id}",
    params(("request_id" = u64, Path, description = "Change request id")),
    responses(
        (status = 200, description = "Change request found", body = ChangeRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Change request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Change requests"
)]
pub async fn get_change_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let request = fetch_request(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or(request.user_id, perm::CHANGE_REQUESTS_VIEW)?;
    Ok(HttpResponse::Ok().json(request))
}

async fn apply_payload(
    tx: &mut Transaction<'_, MySql>,
    settings: &SettingsService,
    requester: u64,
    payload: &ChangePayload,
) -> AppResult<()> {
    match payload {
        ChangePayload::AttendanceEdit {
            attendance_id,
            check_in_time,
            check_out_time,
        } => {
            let sql = format!(
                "SELECT {LOG_COLUMNS} FROM attendance_logs WHERE id = ? AND user_id = ? FOR UPDATE"
            );
            let log = sqlx::query_as::<_, AttendanceLog>(&sql)
                .bind(*attendance_id)
                .bind(requester)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| AppError::Conflict("Attendance log no longer exists".into()))?;

            // the log may have been closed since the request was filed
            if check_out_time.is_none() && !log.is_open() {
                return Err(AppError::Conflict("A closed session cannot be reopened".into()));
            }

            let policy = settings.current().await?;
            let bounds = settings.bounds_for(requester, log.work_date).await?;
            let late = schedule::late_minutes(*check_in_time, &bounds, policy.late_grace_minutes);
            let status = edited_status(&log.status, late);

            let updated = sqlx::query(
                r#"
                UPDATE attendance_logs
                SET check_in_time = ?, check_out_time = ?, late_minutes = ?, status = ?
                WHERE id = ?
                "#,
            )
            .bind(*check_in_time)
            .bind(*check_out_time)
            .bind(late.min(i32::MAX as i64) as i32)
            .bind(status.as_ref())
            .bind(log.id)
            .execute(&mut **tx)
            .await;

            match updated {
                Ok(_) => Ok(()),
                Err(e) if is_unique_violation(&e) => Err(AppError::Conflict(
                    "Edit would leave two open sessions for the same user".into(),
                )),
                Err(e) => Err(e.into()),
            }
        }
        ChangePayload::ScheduleChange {
            work_date,
            work_start,
            work_end,
        } => {
            let policy = settings.current().await?;
            let (start, end) = (parse_wall_clock(work_start)?, parse_wall_clock(work_end)?);
            policy.bounds.with_override(start, end)?;

            sqlx::query(
                r#"
                INSERT INTO schedule_overrides (user_id, work_date, work_start, work_end)
                VALUES (?, ?, ?, ?)
                ON DUPLICATE KEY UPDATE work_start = VALUES(work_start), work_end = VALUES(work_end)
                "#,
            )
            .bind(requester)
            .bind(*work_date)
            .bind(start)
            .bind(end)
            .execute(&mut **tx)
            .await?;
            Ok(())
        }
    }
}

async fn review_change_request(
    auth: &AuthUser,
    pool: &MySqlPool,
    settings: &SettingsService,
    email: &EmailService,
    request_id: u64,
    decision: RequestStatus,
    note: Option<String>,
) -> AppResult<ChangeRequest> {
    auth.require(perm::CHANGE_REQUESTS_APPROVE)?;

    let mut tx = pool.begin().await?;

    let sql = format!("SELECT {REQUEST_COLUMNS} FROM change_requests WHERE id = ? FOR UPDATE");
    let request: ChangeRequest = sqlx::query_as::<_, ChangeRequestRow>(&sql)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(ChangeRequest::from)
        .ok_or_else(|| AppError::not_found("Change request not found"))?;

    if request.user_id == auth.user_id {
        return Err(AppError::forbidden("Cannot review your own change request"));
    }
    if request.status != RequestStatus::Pending.as_ref() {
        return Err(AppError::Conflict("Change request already processed".into()));
    }

    if decision == RequestStatus::Approved {
        apply_payload(&mut tx, settings, request.user_id, &request.payload).await?;
    }

    sqlx::query(
        r#"
        UPDATE change_requests
        SET status = ?, reviewer_id = ?, reviewer_note = ?
        WHERE id = ?
        "#,
    )
    .bind(decision.as_ref())
    .bind(auth.user_id)
    .bind(&note)
    .bind(request_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let request = fetch_request(pool, request_id).await?;
    tracing::info!(request_id, reviewer = auth.user_id, status = %decision, kind = %request.kind, "Change request reviewed");

    let vars = Variables::from([
        ("employee_name", display_name(pool, request.user_id).await?),
        ("kind", request.kind.clone()),
        ("request_id", request.id.to_string()),
        ("status", request.status.clone()),
        ("reviewer_note", note.unwrap_or_default()),
    ]);
    email.dispatch_to_profile("change_request_reviewed", request.user_id, vars);

    Ok(request)
}

#[utoipa::path(
    put,
    path = "/api/change-requests/{request_id}/approve",
    params(("request_id" = u64, Path, description = "Change request id")),
    request_body(content = ReviewNote, description = "Optional reviewer note"),
    responses(
        (status = 200, description = "Approved and applied", body = ChangeRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Change request not found"),
        (status = 409, description = "Already processed or no longer applicable")
    ),
    security(("bearer_auth" = [])),
    tag = "Change requests"
)]
pub async fn approve_change_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    email: web::Data<EmailService>,
    path: web::Path<u64>,
    payload: Option<web::Json<ReviewNote>>,
) -> AppResult<HttpResponse> {
    let note = payload.map(|p| p.into_inner()).unwrap_or_default().note;
    let request = review_change_request(
        &auth,
        pool.get_ref(),
        settings.get_ref(),
        email.get_ref(),
        path.into_inner(),
        RequestStatus::Approved,
        note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/change-requests/{request_id}/reject",
    params(("request_id" = u64, Path, description = "Change request id")),
    request_body(content = ReviewNote, description = "Optional reviewer note"),
    responses(
        (status = 200, description = "Rejected", body = ChangeRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Change request not found"),
        (status = 409, description = "Already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Change requests"
)]
pub async fn reject_change_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    email: web::Data<EmailService>,
    path: web::Path<u64>,
    payload: Option<web::Json<ReviewNote>>,
) -> AppResult<HttpResponse> {
    let note = payload.map(|p| p.into_inner()).unwrap_or_default().note;
    let request = review_change_request(
        &auth,
        pool.get_ref(),
        settings.get_ref(),
        email.get_ref(),
        path.into_inner(),
        RequestStatus::Rejected,
        note,
    )
    .await?;
    Ok(HttpResponse::Ok().json(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bounds() -> ScheduleBounds {
        ScheduleBounds::parse("08:30", "12:00", "13:30", "17:30", 420).unwrap()
    }

    fn log(user_id: u64) -> AttendanceLog {
        let b = bounds();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        AttendanceLog {
            id: 11,
            user_id,
            work_date: date,
            check_in_time: b.instant_at(date, parse_wall_clock("09:10").unwrap()),
            check_out_time: None,
            status: "late".into(),
            late_minutes: 40,
            check_in_method: "gps".into(),
            latitude: None,
            longitude: None,
            ip_address: None,
        }
    }

    fn edit(check_in: &str, check_out: Option<&str>) -> ChangePayload {
        let b = bounds();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        ChangePayload::AttendanceEdit {
            attendance_id: 11,
            check_in_time: b.instant_at(date, parse_wall_clock(check_in).unwrap()),
            check_out_time: check_out.map(|t| b.instant_at(date, parse_wall_clock(t).unwrap())),
        }
    }

    #[test]
    fn attendance_edit_targets_own_log_only() {
        let own = log(7);
        assert!(validate_payload(&edit("08:30", Some("17:30")), 7, Some(&own), &bounds()).is_ok());

        let foreign = log(8);
        assert!(matches!(
            validate_payload(&edit("08:30", None), 7, Some(&foreign), &bounds()),
            Err(AppError::NotFound(_))
        ));
        assert!(validate_payload(&edit("08:30", None), 7, None, &bounds()).is_err());
    }

    #[test]
    fn attendance_edit_cannot_reopen_closed_log() {
        let b = bounds();
        let mut closed = log(7);
        closed.check_out_time = Some(b.instant_at(closed.work_date, parse_wall_clock("17:30").unwrap()));

        assert!(matches!(
            validate_payload(&edit("08:30", None), 7, Some(&closed), &b),
            Err(AppError::Validation(_))
        ));
        assert!(validate_payload(&edit("08:30", Some("17:00")), 7, Some(&closed), &b).is_ok());

        // an open log may stay open with a corrected check-in
        assert!(validate_payload(&edit("08:30", None), 7, Some(&log(7)), &b).is_ok());
    }

    #[test]
    fn attendance_edit_rejects_inverted_times() {
        let own = log(7);
        assert!(matches!(
            validate_payload(&edit("17:30", Some("08:30")), 7, Some(&own), &bounds()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn schedule_change_must_fit_lunch_window() {
        let ok = ChangePayload::ScheduleChange {
            work_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            work_start: "10:00".into(),
            work_end: "19:00".into(),
        };
        assert!(validate_payload(&ok, 7, None, &bounds()).is_ok());

        let overlaps_lunch = ChangePayload::ScheduleChange {
            work_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            work_start: "12:30".into(),
            work_end: "19:00".into(),
        };
        assert!(validate_payload(&overlaps_lunch, 7, None, &bounds()).is_err());

        let garbage = ChangePayload::ScheduleChange {
            work_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            work_start: "ten".into(),
            work_end: "19:00".into(),
        };
        assert!(validate_payload(&garbage, 7, None, &bounds()).is_err());
    }

    #[test]
    fn edited_status_recomputes_lateness() {
        assert_eq!(edited_status("late", 0), AttendanceStatus::Present);
        assert_eq!(edited_status("present", 12), AttendanceStatus::Late);
        assert_eq!(edited_status("leave", 12), AttendanceStatus::Leave);
    }
}
