use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::{AppError, AppResult};
use crate::model::attendance::AttendanceLog;
use crate::models::Pagination;
use crate::services::attendance::{
    self as lifecycle, AttendanceRepository, CheckInContext, LOG_COLUMNS, MySqlAttendanceRepository,
};
use crate::services::location::{CheckInMethod, LocationClaim};
use crate::services::report::{self, OverrideMap};
use crate::services::schedule::WorkBreakdown;
use crate::services::settings::SettingsService;
use crate::utils::db_utils::QueryFilter;
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::net::IpAddr;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = "gps")]
    pub method: CheckInMethod,
    #[schema(example = 10.7769)]
    pub latitude: Option<f64>,
    #[schema(example = 106.7009)]
    pub longitude: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckOutResponse {
    pub log: AttendanceLog,
    pub breakdown: WorkBreakdown,
}

#[derive(Serialize, ToSchema)]
pub struct CurrentSessionResponse {
    /// The open session, `null` when checked out
    pub session: Option<AttendanceLog>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub log: AttendanceLog,
    pub breakdown: WorkBreakdown,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceListResponse {
    pub data: Vec<AttendanceEntry>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// Whose logs; defaults to the caller, or everyone with `attendance.view`
    pub user_id: Option<u64>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Month as `YYYY-MM`
    #[param(example = "2026-10")]
    pub month: String,
    pub user_id: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    #[param(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[param(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub user_id: Option<u64>,
}

/// Direct peer address only, forwarded headers are client controlled.
fn peer_ip(req: &HttpRequest) -> Option<IpAddr> {
    req.peer_addr().map(|addr| addr.ip())
}

fn date_range_filter(user_id: Option<u64>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> QueryFilter {
    let mut filter = QueryFilter::new();
    filter
        .push("user_id = ?", user_id)
        .push("work_date >= ?", from)
        .push("work_date <= ?", to);
    filter
}

async fn fetch_logs(
    pool: &MySqlPool,
    filter: &QueryFilter,
    page: Option<(u32, u64)>,
) -> AppResult<Vec<AttendanceLog>> {
    let limit = if page.is_some() { " LIMIT ? OFFSET ?" } else { "" };
    let sql = format!(
        "SELECT {LOG_COLUMNS} FROM attendance_logs{} ORDER BY work_date DESC, check_in_time DESC{limit}",
        filter.where_clause()
    );

    let mut query = filter.bind_as(sqlx::query_as::<_, AttendanceLog>(&sql));
    if let Some((per_page, offset)) = page {
        query = query.bind(per_page).bind(offset);
    }
    Ok(query.fetch_all(pool).await?)
}

/* =========================
Check-in
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Session opened", body = AttendanceLog),
        (status = 400, description = "Missing coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Location rejected", body = Object, example = json!({
            "error": "Location rejected: 812m from office, allowed 200m"
        })),
        (status = 409, description = "Already checked in", body = Object, example = json!({
            "error": "Already checked in, check out first"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_in(
    auth: AuthUser,
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    payload: web::Json<CheckInRequest>,
) -> AppResult<HttpResponse> {
    let now = Utc::now();
    let policy = settings.current().await?;
    let bounds = settings
        .bounds_for(auth.user_id, policy.bounds.local_date(now))
        .await?;

    let repo = MySqlAttendanceRepository::new(pool.get_ref().clone());
    let log = lifecycle::check_in(
        &repo,
        CheckInContext {
            user_id: auth.user_id,
            now,
            bounds: &bounds,
            late_grace_minutes: policy.late_grace_minutes,
            policy: &policy.location,
            claim: LocationClaim {
                method: payload.method,
                latitude: payload.latitude,
                longitude: payload.longitude,
                ip: peer_ip(&req),
            },
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(log))
}

/* =========================
Check-out
========================= */
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Session closed", body = CheckOutResponse),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "No open session", body = Object, example = json!({
            "error": "No open attendance session found"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
) -> AppResult<HttpResponse> {
    let repo = MySqlAttendanceRepository::new(pool.get_ref().clone());

    // Bounds of the day the session was opened on, not of today.
    let open = repo
        .find_open(auth.user_id)
        .await?
        .ok_or(AppError::NoOpenSession)?;
    let bounds = settings.bounds_for(auth.user_id, open.work_date).await?;

    let (log, breakdown) = lifecycle::check_out(&repo, auth.user_id, Utc::now(), &bounds).await?;

    Ok(HttpResponse::Ok().json(CheckOutResponse { log, breakdown }))
}

#[utoipa::path(
    get,
    path = "/api/attendance/current",
    responses(
        (status = 200, description = "Open session of the caller", body = CurrentSessionResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn current_session(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let repo = MySqlAttendanceRepository::new(pool.get_ref().clone());
    let session = repo.find_open(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(CurrentSessionResponse { session }))
}

/* =========================
Listing / statistics / export
========================= */
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery, Pagination),
    responses(
        (status = 200, description = "Paginated attendance logs", body = AttendanceListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    query: web::Query<AttendanceQuery>,
    paging: web::Query<Pagination>,
) -> AppResult<HttpResponse> {
    let user_id = auth.scope_user_filter(query.user_id, perm::ATTENDANCE_VIEW)?;
    let (page, per_page, offset) = paging.resolve();
    let filter = date_range_filter(user_id, query.from, query.to);

    let count_sql = format!("SELECT COUNT(*) FROM attendance_logs{}", filter.where_clause());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let logs = fetch_logs(pool.get_ref(), &filter, Some((per_page, offset))).await?;

    let policy = settings.current().await?;
    let overrides = report::load_override_maps(pool.get_ref(), &logs).await?;
    let empty = OverrideMap::new();

    let data = logs
        .into_iter()
        .map(|log| {
            let user_overrides = overrides.get(&log.user_id).unwrap_or(&empty);
            let breakdown = report::breakdown_for(&log, &policy.bounds, user_overrides);
            AttendanceEntry { log, breakdown }
        })
        .collect();

    Ok(HttpResponse::Ok().json(AttendanceListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    params(StatsQuery),
    responses(
        (status = 200, description = "Monthly attendance summary", body = AttendanceSummary),
        (status = 400, description = "Invalid month"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_stats(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    query: web::Query<StatsQuery>,
) -> AppResult<HttpResponse> {
    let user_id = query.user_id.unwrap_or(auth.user_id);
    auth.require_self_or(user_id, perm::ATTENDANCE_VIEW)?;

    let (first, last) = report::month_range(&query.month)?;
    let filter = date_range_filter(Some(user_id), Some(first), Some(last));
    let logs = fetch_logs(pool.get_ref(), &filter, None).await?;

    let policy = settings.current().await?;
    let overrides = report::load_override_maps(pool.get_ref(), &logs)
        .await?
        .remove(&user_id)
        .unwrap_or_default();

    let leave_hours = sqlx::query_scalar::<_, f64>(
        r#"
        SELECT COALESCE(SUM(duration_hours), 0)
        FROM leave_requests
        WHERE user_id = ?
        AND status = 'approved'
        AND leave_date BETWEEN ? AND ?
        "#,
    )
    .bind(user_id)
    .bind(first)
    .bind(last)
    .fetch_one(pool.get_ref())
    .await?;

    let summary = report::summarize(
        user_id,
        query.month.trim(),
        &logs,
        &policy.bounds,
        &overrides,
        leave_hours,
    );

    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/attendance/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "CSV of attendance logs with computed minutes", content_type = "text/csv", body = String),
        (status = 400, description = "Invalid range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn export_attendance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    settings: web::Data<SettingsService>,
    query: web::Query<ExportQuery>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ATTENDANCE_EXPORT)?;

    if query.from > query.to {
        return Err(AppError::validation("from cannot be after to"));
    }

    let filter = date_range_filter(query.user_id, Some(query.from), Some(query.to));
    let logs = fetch_logs(pool.get_ref(), &filter, None).await?;

    let policy = settings.current().await?;
    let overrides = report::load_override_maps(pool.get_ref(), &logs).await?;
    let empty = OverrideMap::new();

    let csv = report::export_csv(&logs, |user_id| {
        (&policy.bounds, overrides.get(&user_id).unwrap_or(&empty))
    })?;

    tracing::info!(rows = logs.len(), from = %query.from, to = %query.to, "Attendance exported");

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"attendance_{}_{}.csv\"", query.from, query.to),
        ))
        .body(csv))
}
