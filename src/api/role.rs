use crate::api::profile::find_profile;
use crate::auth::auth::{AuthUser, PermissionCache};
use crate::auth::permissions::{PermissionSet, perm};
use crate::error::{AppError, AppResult, is_unique_violation};
use crate::model::role::{Role, RoleRow};
use crate::models::MessageResponse;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RolePayload {
    #[schema(example = "team_lead")]
    pub name: String,
    #[schema(example = json!(["leave.view", "leave.approve", "attendance.view"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRole {
    /// `null` removes the role
    #[schema(example = 2)]
    pub role_id: Option<u64>,
}

/// Normalised `(name, permissions)` or every problem found.
fn validate_role(payload: RolePayload) -> AppResult<(String, Vec<String>)> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("Role name cannot be empty"));
    }

    let set = PermissionSet::new(payload.permissions);
    let violations = set.violations();
    if !violations.is_empty() {
        return Err(AppError::validation(format!(
            "Invalid permissions: {}",
            violations.join("; ")
        )));
    }

    Ok((name, set.into_vec()))
}

async fn fetch_role(pool: &MySqlPool, id: u64) -> AppResult<Role> {
    sqlx::query_as::<_, RoleRow>("SELECT id, name, permissions FROM roles WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Role::from)
        .ok_or_else(|| AppError::not_found("Role not found"))
}

fn name_conflict(e: sqlx::Error, name: &str) -> AppError {
    if is_unique_violation(&e) {
        AppError::Conflict(format!("Role '{name}' already exists"))
    } else {
        e.into()
    }
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles", body = [Role]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn list_roles(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_VIEW)?;

    let roles: Vec<Role> =
        sqlx::query_as::<_, RoleRow>("SELECT id, name, permissions FROM roles ORDER BY name")
            .fetch_all(pool.get_ref())
            .await?
            .into_iter()
            .map(Role::from)
            .collect();

    Ok(HttpResponse::Ok().json(roles))
}

#[utoipa::path(
    get,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role found", body = Role),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn get_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_VIEW)?;
    Ok(HttpResponse::Ok().json(fetch_role(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = RolePayload,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Invalid permissions", body = Object, example = json!({
            "error": "Invalid permissions: 'leave.approve' requires 'leave.view'"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Name taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn create_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<RolePayload>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_MANAGE)?;
    let (name, permissions) = validate_role(payload.into_inner())?;

    let result = sqlx::query("INSERT INTO roles (name, permissions) VALUES (?, ?)")
        .bind(&name)
        .bind(Json(&permissions))
        .execute(pool.get_ref())
        .await
        .map_err(|e| name_conflict(e, &name))?;

    tracing::info!(role = %name, by = auth.user_id, "Role created");
    Ok(HttpResponse::Created().json(fetch_role(pool.get_ref(), result.last_insert_id()).await?))
}

#[utoipa::path(
    put,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role id")),
    request_body = RolePayload,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "Invalid permissions"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Name taken")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn update_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<PermissionCache>,
    path: web::Path<u64>,
    payload: web::Json<RolePayload>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_MANAGE)?;
    let role_id = path.into_inner();
    let (name, permissions) = validate_role(payload.into_inner())?;

    fetch_role(pool.get_ref(), role_id).await?;

    sqlx::query("UPDATE roles SET name = ?, permissions = ? WHERE id = ?")
        .bind(&name)
        .bind(Json(&permissions))
        .bind(role_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| name_conflict(e, &name))?;

    cache.invalidate_all();
    tracing::info!(role_id, by = auth.user_id, "Role updated");

    Ok(HttpResponse::Ok().json(fetch_role(pool.get_ref(), role_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{role_id}",
    params(("role_id" = u64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role deleted, holders keep no role", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn delete_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<PermissionCache>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_MANAGE)?;
    let role_id = path.into_inner();

    let result = sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Role not found"));
    }

    cache.invalidate_all();
    tracing::info!(role_id, by = auth.user_id, "Role deleted");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Role deleted")))
}

#[utoipa::path(
    put,
    path = "/api/profiles/{profile_id}/role",
    params(("profile_id" = u64, Path, description = "Profile id")),
    request_body = AssignRole,
    responses(
        (status = 200, description = "Role assigned", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Profile or role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn assign_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<PermissionCache>,
    path: web::Path<u64>,
    payload: web::Json<AssignRole>,
) -> AppResult<HttpResponse> {
    auth.require(perm::ROLES_MANAGE)?;
    let profile_id = path.into_inner();

    find_profile(pool.get_ref(), profile_id)
        .await?
        .ok_or_else(|| AppError::not_found("Profile not found"))?;
    if let Some(role_id) = payload.role_id {
        fetch_role(pool.get_ref(), role_id).await?;
    }

    sqlx::query("UPDATE profiles SET role_id = ? WHERE id = ?")
        .bind(payload.role_id)
        .bind(profile_id)
        .execute(pool.get_ref())
        .await?;

    cache.invalidate(profile_id).await;
    tracing::info!(profile_id, role_id = ?payload.role_id, by = auth.user_id, "Role assigned");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Role assigned")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str, permissions: &[&str]) -> RolePayload {
        RolePayload {
            name: name.into(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn valid_role_is_normalised() {
        let (name, perms) =
            validate_role(payload(" lead ", &["leave.approve", "leave.view", "leave.view"])).unwrap();
        assert_eq!(name, "lead");
        assert_eq!(perms, vec!["leave.approve".to_string(), "leave.view".to_string()]);
    }

    #[test]
    fn ungated_permission_is_rejected() {
        let err = validate_role(payload("lead", &["leave.approve"])).unwrap_err();
        match err {
            AppError::Validation(msg) => assert!(msg.contains("'leave.approve' requires 'leave.view'")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(validate_role(payload("  ", &["*"])).is_err());
    }
}
