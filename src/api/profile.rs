use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::{AppError, AppResult};
use crate::model::role::Profile;
use crate::services::org_chart::build_org_chart;
use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;

const PROFILE_COLUMNS: &str = "id, full_name, email, department, role_id, manager_id";

pub async fn find_profile(pool: &MySqlPool, id: u64) -> AppResult<Option<Profile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?");
    Ok(sqlx::query_as::<_, Profile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Display name for notifications, falls back to the id.
pub async fn display_name(pool: &MySqlPool, id: u64) -> AppResult<String> {
    Ok(find_profile(pool, id)
        .await?
        .map(|p| p.full_name)
        .unwrap_or_else(|| format!("#{id}")))
}

#[utoipa::path(
    get,
    path = "/api/profiles/org-chart",
    responses(
        (status = 200, description = "Reporting tree built from manager links", body = [OrgNode]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Profiles"
)]
pub async fn org_chart(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require(perm::EMPLOYEES_VIEW)?;

    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY full_name");
    let profiles = sqlx::query_as::<_, Profile>(&sql)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(build_org_chart(&profiles)))
}

#[utoipa::path(
    get,
    path = "/api/profiles/me",
    responses(
        (status = 200, description = "Profile of the caller", body = Profile),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile for this account")
    ),
    security(("bearer_auth" = [])),
    tag = "Profiles"
)]
pub async fn my_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let profile = find_profile(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    Ok(HttpResponse::Ok().json(profile))
}
