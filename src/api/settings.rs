use crate::auth::auth::AuthUser;
use crate::auth::permissions::perm;
use crate::error::AppResult;
use crate::model::settings::CompanySettings;
use crate::services::settings::SettingsService;
use actix_web::{HttpResponse, web};

#[utoipa::path(
    get,
    path = "/api/settings",
    responses(
        (status = 200, description = "Company work-hour and location policy", body = CompanySettings),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_settings(
    auth: AuthUser,
    settings: web::Data<SettingsService>,
) -> AppResult<HttpResponse> {
    auth.require(perm::SETTINGS_VIEW)?;
    let policy = settings.current().await?;
    Ok(HttpResponse::Ok().json(&policy.settings))
}

#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = CompanySettings,
    responses(
        (status = 200, description = "Settings saved", body = CompanySettings),
        (status = 400, description = "Bounds out of order or invalid location policy", body = Object, example = json!({
            "error": "Schedule must satisfy work_start < lunch_start <= lunch_end < work_end"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_settings(
    auth: AuthUser,
    settings: web::Data<SettingsService>,
    payload: web::Json<CompanySettings>,
) -> AppResult<HttpResponse> {
    auth.require(perm::SETTINGS_MANAGE)?;
    let policy = settings.update(payload.into_inner()).await?;
    tracing::info!(by = auth.user_id, "Settings changed");
    Ok(HttpResponse::Ok().json(&policy.settings))
}
