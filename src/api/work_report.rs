use crate::api::profile::display_name;
use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::model::leave_request::RequestStatus;
use crate::model::work_report::{ReportType, WorkReport};
use crate::models::Pagination;
use crate::services::email::{EmailService, Variables};
use crate::utils::db_utils::QueryFilter;
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

const REPORT_COLUMNS: &str =
    "id, user_id, report_date, report_type, content, status, reviewer_note, reviewer_id, created_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReport {
    /// Any day inside the period, stored as the period start
    #[schema(example = "2026-10-22", format = "date", value_type = String)]
    pub report_date: NaiveDate,
    #[schema(example = "weekly")]
    pub report_type: ReportType,
    #[schema(example = "Finished the payroll import, started on exports.")]
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReviewReport {
    /// `approved` or `rejected`
    #[schema(example = "approved")]
    pub status: RequestStatus,
    #[schema(example = "Good progress")]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportFilter {
    pub user_id: Option<u64>,
    pub report_type: Option<ReportType>,
    pub status: Option<RequestStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct ReportListResponse {
    pub data: Vec<WorkReport>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

async fn fetch_report(pool: &MySqlPool, id: u64) -> AppResult<WorkReport> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM work_reports WHERE id = ?");
    sqlx::query_as::<_, WorkReport>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Work report not found"))
}

fn validate_review(review: &ReviewReport) -> AppResult<()> {
    match review.status {
        RequestStatus::Approved | RequestStatus::Rejected => Ok(()),
        other => Err(AppError::validation(format!(
            "Review status must be approved or rejected, got {other}"
        ))),
    }
}

#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = CreateReport,
    responses(
        (status = 201, description = "Report submitted", body = WorkReport),
        (status = 400, description = "Empty content"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "A report for that period already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn create_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateReport>,
) -> AppResult<HttpResponse> {
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(AppError::validation("content cannot be empty"));
    }

    let report_date = payload.report_type.period_start(payload.report_date);

    let result = sqlx::query(
        r#"
        INSERT INTO work_reports (user_id, report_date, report_type, content, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(report_date)
    .bind(payload.report_type.as_ref())
    .bind(content)
    .bind(RequestStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await;

    let id = match result {
        Ok(done) => done.last_insert_id(),
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict(format!(
                "A {} report for {report_date} already exists",
                payload.report_type
            )));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(HttpResponse::Created().json(fetch_report(pool.get_ref(), id).await?))
}

#[utoipa::path(
    get,
    path = "/api/reports",
    params(ReportFilter, Pagination),
    responses(
        (status = 200, description = "Paginated reports", body = ReportListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn list_reports(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportFilter>,
    paging: web::Query<Pagination>,
) -> AppResult<HttpResponse> {
    let user_id = auth.scope_user_filter(query.user_id, perm::REPORTS_VIEW)?;
    let (page, per_page, offset) = paging.resolve();

    let mut filter = QueryFilter::new();
    filter
        .push("user_id = ?", user_id)
        .push("report_type = ?", query.report_type.map(|t| t.to_string()))
        .push("status = ?", query.status.map(|s| s.to_string()));

    let count_sql = format!("SELECT COUNT(*) FROM work_reports{}", filter.where_clause());
    let total = filter
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {REPORT_COLUMNS} FROM work_reports{} ORDER BY report_date DESC, id DESC LIMIT ? OFFSET ?",
        filter.where_clause()
    );
    let data = filter
        .bind_as(sqlx::query_as::<_, WorkReport>(&data_sql))
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(ReportListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/reports/{report_id}",
    params(("report_id" = u64, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report found", body = WorkReport),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Report not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn get_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let report = fetch_report(pool.get_ref(), path.into_inner()).await?;
    auth.require_self_or(report.user_id, perm::REPORTS_VIEW)?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    put,
    path = "/api/reports/{report_id}/review",
    params(("report_id" = u64, Path, description = "Report id")),
    request_body = ReviewReport,
    responses(
        (status = 200, description = "Report reviewed", body = WorkReport),
        (status = 400, description = "Invalid review status"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Report not found"),
        (status = 409, description = "Report already reviewed")
    ),
    security(("bearer_auth" = [])),
    tag = "Reports"
)]
pub async fn review_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    email: web::Data<EmailService>,
    path: web::Path<u64>,
    payload: web::Json<ReviewReport>,
) -> AppResult<HttpResponse> {
    auth.require(perm::REPORTS_REVIEW)?;
    validate_review(&payload)?;

    let report_id = path.into_inner();
    let report = fetch_report(pool.get_ref(), report_id).await?;
    if report.user_id == auth.user_id {
        return Err(AppError::forbidden("Cannot review your own report"));
    }

    let result = sqlx::query(
        r#"
        UPDATE work_reports
        SET status = ?, reviewer_note = ?, reviewer_id = ?
        WHERE id = ?
        AND status = 'pending'
        "#,
    )
    .bind(payload.status.as_ref())
    .bind(&payload.note)
    .bind(auth.user_id)
    .bind(report_id)
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Conflict("Report already reviewed".into()));
    }

    let report = fetch_report(pool.get_ref(), report_id).await?;
    tracing::info!(report_id, reviewer = auth.user_id, status = %report.status, "Report reviewed");

    let vars = Variables::from([
        ("employee_name", display_name(pool.get_ref(), report.user_id).await?),
        ("report_type", report.report_type.clone()),
        ("report_date", report.report_date.to_string()),
        ("status", report.status.clone()),
        ("reviewer_note", report.reviewer_note.clone().unwrap_or_default()),
    ]);
    email.dispatch_to_profile("report_reviewed", report.user_id, vars);

    Ok(HttpResponse::Ok().json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_only_accepts_final_states() {
        let review = |status| ReviewReport { status, note: None };
        assert!(validate_review(&review(RequestStatus::Approved)).is_ok());
        assert!(validate_review(&review(RequestStatus::Rejected)).is_ok());
        assert!(validate_review(&review(RequestStatus::Pending)).is_err());
        assert!(validate_review(&review(RequestStatus::Cancelled)).is_err());
    }

    #[test]
    fn create_payload_shape() {
        let body: CreateReport = serde_json::from_str(
            r#"{"report_date":"2026-10-22","report_type":"monthly","content":"done"}"#,
        )
        .unwrap();
        assert_eq!(body.report_type, ReportType::Monthly);
        assert_eq!(
            body.report_type.period_start(body.report_date),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
        );
    }
}
