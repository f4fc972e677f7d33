use crate::api::profile::{display_name, find_profile};
use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::{AppError, AppResult};
use crate::model::attendance::AttendanceStatus;
use crate::model::leave_request::{LeaveRequest, LeaveType, RequestStatus};
use crate::models::{MessageResponse, Pagination};
use crate::services::email::{EmailService, Variables};
use crate::services::location::MANUAL_METHOD;
use crate::services::settings::SettingsService;
use crate::utils::db_utils::QueryFilter;
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

const LEAVE_COLUMNS: &str =
    "id, user_id, leave_date, leave_type, status, duration_hours, reason, reviewer_id, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-11-02", format = "date", value_type = String)]
    pub leave_date: NaiveDate,
    #[schema(example = "partial")]
    pub leave_type: LeaveType,
    /// Required for `partial` leave, ignored otherwise
    #[schema(example = 2.0)]
    pub duration_hours: Option<f64>,
    #[schema(example = "Dentist appointment")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaveFilter {
    /// Filter by requester; defaults to the caller without `leave.view`
    #[param(example = 42)]
    pub user_id: Option<u64>,
    /// Filter by status
    pub status: Option<RequestStatus>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

pub async fn fetch_leave(pool: &MySqlPool, id: u64) -> AppResult<LeaveRequest> {
    let sql = format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?");
    sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Leave request not found"))
}

fn leave_variables(employee_name: String, leave: &LeaveRequest) -> Variables {
    Variables::from([
        ("employee_name", employee_name),
        ("leave_type", leave.leave_type.clone()),
        ("leave_date", leave.leave_date.to_string()),
        ("duration_hours", format!("{}", leave.duration_hours)),
    ])
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Invalid duration"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A leave request already exists for that date")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    email: web::Data<EmailService>,
    payload: web::Json<CreateLeave>,
) -> AppResult<HttpResponse> {
    let payload = payload.into_inner();

    let bounds = settings.bounds_for(auth.user_id, payload.leave_date).await?;
    let hours = payload
        .leave_type
        .duration_hours(payload.duration_hours, bounds.standard_day_minutes())?;

    let existing = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM leave_requests
        WHERE user_id = ?
        AND leave_date = ?
        AND status IN ('pending', 'approved')
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.leave_date)
    .fetch_one(pool.get_ref())
    .await?;

    if existing > 0 {
        return Err(AppError::Conflict(format!(
            "A leave request for {} is already pending or approved",
            payload.leave_date
        )));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (user_id, leave_date, leave_type, status, duration_hours, reason)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.leave_date)
    .bind(payload.leave_type.as_ref())
    .bind(RequestStatus::Pending.as_ref())
    .bind(hours)
    .bind(&payload.reason)
    .execute(pool.get_ref())
    .await?;

    let leave = fetch_leave(pool.get_ref(), result.last_insert_id()).await?;
    tracing::info!(leave_id = leave.id, user_id = auth.user_id, hours, "Leave request submitted");

    if let Some(profile) = find_profile(pool.get_ref(), auth.user_id).await? {
        match profile.manager_id {
            Some(manager_id) => email.dispatch_to_profile(
                "leave_submitted",
                manager_id,
                leave_variables(profile.full_name, &leave),
            ),
            None => tracing::debug!(user_id = auth.user_id, "No manager to notify"),
        }
    }

    Ok(HttpResponse::Created().json(leave))
}

/* =========================
Approve / reject / cancel
========================= */
async fn review_leave(
    auth: &AuthUser,
    pool: &MySqlPool,
    settings: &SettingsService,
    email: &EmailService,
    leave_id: u64,
    decision: RequestStatus,
) -> AppResult<LeaveRequest> {
    auth.require(perm::LEAVE_APPROVE)?;

    let leave = fetch_leave(pool, leave_id).await?;
    if leave.user_id == auth.user_id {
        return Err(AppError::forbidden("Cannot review your own leave request"));
    }

    let records_day = decision == RequestStatus::Approved
        && leave.leave_type.parse::<LeaveType>().ok() == Some(LeaveType::FullDay);
    let bounds = settings.bounds_for(leave.user_id, leave.leave_date).await?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, reviewer_id = ?
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(decision.as_ref())
    .bind(auth.user_id)
    .bind(leave_id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Leave request already processed".into()));
    }

    // A full-day leave shows up in attendance as a closed `leave` log.
    if records_day {
        sqlx::query(
            r#"
            INSERT INTO attendance_logs
                (user_id, work_date, check_in_time, check_out_time, status,
                 late_minutes, check_in_method)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(leave.user_id)
        .bind(leave.leave_date)
        .bind(bounds.instant_at(leave.leave_date, bounds.work_start))
        .bind(bounds.instant_at(leave.leave_date, bounds.work_end))
        .bind(AttendanceStatus::Leave.as_ref())
        .bind(MANUAL_METHOD)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let leave = fetch_leave(pool, leave_id).await?;
    tracing::info!(leave_id, reviewer = auth.user_id, status = %decision, "Leave reviewed");

    let slug = if decision == RequestStatus::Approved {
        "leave_approved"
    } else {
        "leave_rejected"
    };
    let name = display_name(pool, leave.user_id).await?;
    email.dispatch_to_profile(slug, leave.user_id, leave_variables(name, &leave));

    Ok(leave)
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    responses(
        (status = 200, description = "Leave approved", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed", body = Object, example = json!({
            "error": "Leave request already processed"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    email: web::Data<EmailService>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave = review_leave(
        &auth,
        pool.get_ref(),
        settings.get_ref(),
        email.get_ref(),
        path.into_inner(),
        RequestStatus::Approved,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Leave request already processed")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    email: web::Data<EmailService>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave = review_leave(
        &auth,
        pool.get_ref(),
        settings.get_ref(),
        email.get_ref(),
        path.into_inner(),
        RequestStatus::Rejected,
    )
    .await?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the caller's pending leave request")
    ),
    responses(
        (status = 200, description = "Leave cancelled", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Only pending requests can be cancelled")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave_id = path.into_inner();
    let leave = fetch_leave(pool.get_ref(), leave_id).await?;

    if leave.user_id != auth.user_id {
        return Err(AppError::forbidden("Only the requester can cancel a leave request"));
    }

    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(RequestStatus::Cancelled.as_ref())
    .bind(leave_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Only pending requests can be cancelled".into()));
    }

    Ok(HttpResponse::Ok().json(MessageResponse::new("Leave cancelled")))
}

/* =========================
Read
========================= */
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "error": "Leave request not found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or(leave.user_id, perm::LEAVE_VIEW)?;
    Ok(HttpResponse::Ok().json(leave))
}

#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter, Pagination),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
    paging: web::Query<Pagination>,
) -> AppResult<HttpResponse> {
    let user_id = auth.scope_user_filter(query.user_id, perm::LEAVE_VIEW)?;
    let (page, per_page, offset) = paging.resolve();

    let mut filter = QueryFilter::new();
    filter
        .push("user_id = ?", user_id)
        .push("status = ?", query.status.map(|s| s.as_ref().to_string()))
        .push("leave_date >= ?", query.from)
        .push("leave_date <= ?", query.to);

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", filter.where_clause());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
        filter.where_clause()
    );
    let data = filter
        .bind_as(sqlx::query_as::<_, LeaveRequest>(&data_sql))
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page,
        per_page,
        total,
    }))
}
