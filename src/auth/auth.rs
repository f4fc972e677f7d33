use crate::auth::jwt::{bearer_token, verify_access_token};
use crate::auth::permissions::PermissionSet;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::Claims;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::LocalBoxFuture;
use moka::future::Cache;
use sqlx::MySqlPool;
use sqlx::types::Json;
use std::sync::Arc;
use std::time::Duration;

/// Role permissions per profile id, shared by all workers.
#[derive(Clone)]
pub struct PermissionCache {
    inner: Cache<u64, Arc<PermissionSet>>,
}

impl PermissionCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(50_000)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    pub async fn get_or_load(&self, pool: &MySqlPool, user_id: u64) -> AppResult<Arc<PermissionSet>> {
        if let Some(hit) = self.inner.get(&user_id).await {
            return Ok(hit);
        }

        let loaded = Arc::new(load_permissions(pool, user_id).await?);
        self.inner.insert(user_id, loaded.clone()).await;
        Ok(loaded)
    }

    pub async fn invalidate(&self, user_id: u64) {
        self.inner.invalidate(&user_id).await;
    }

    /// Role definitions changed, every entry may be stale.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

async fn load_permissions(pool: &MySqlPool, user_id: u64) -> AppResult<PermissionSet> {
    let row = sqlx::query_scalar::<_, Json<Vec<String>>>(
        r#"
        SELECT r.permissions
        FROM profiles p
        JOIN roles r ON r.id = p.role_id
        WHERE p.id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|Json(entries)| PermissionSet::new(entries))
        .unwrap_or_default())
}

pub struct AuthUser {
    pub user_id: u64,
    pub permissions: Arc<PermissionSet>,
}

fn claims_from_request(req: &HttpRequest) -> AppResult<Claims> {
    if let Some(claims) = req.extensions().get::<Claims>() {
        return Ok(claims.clone());
    }

    // Routes outside the protected scope still decode the header themselves.
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config missing".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    verify_access_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = claims_from_request(req);
        let pool = req.app_data::<Data<MySqlPool>>().cloned();
        let cache = req.app_data::<Data<PermissionCache>>().cloned();

        Box::pin(async move {
            let claims = claims?;
            let (Some(pool), Some(cache)) = (pool, cache) else {
                return Err(AppError::Internal("Permission store missing".into()));
            };

            let permissions = cache.get_or_load(pool.get_ref(), claims.user_id).await?;

            Ok(AuthUser {
                user_id: claims.user_id,
                permissions,
            })
        })
    }
}

impl AuthUser {
    pub fn can(&self, permission: &str) -> bool {
        self.permissions.allows(permission)
    }

    pub fn require(&self, permission: &str) -> AppResult<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("Missing permission: {permission}")))
        }
    }

    /// Own records are always visible, anyone else's needs `permission`.
    pub fn require_self_or(&self, owner_id: u64, permission: &str) -> AppResult<()> {
        if owner_id == self.user_id {
            Ok(())
        } else {
            self.require(permission)
        }
    }

    /// Resolves an optional `user_id` filter: absent means "me" unless the
    /// caller may see everyone.
    pub fn scope_user_filter(&self, requested: Option<u64>, permission: &str) -> AppResult<Option<u64>> {
        match requested {
            Some(id) => {
                self.require_self_or(id, permission)?;
                Ok(Some(id))
            }
            None if self.can(permission) => Ok(None),
            None => Ok(Some(self.user_id)),
        }
    }
}

#[cfg(test)]
impl PermissionCache {
    pub async fn seed(&self, user_id: u64, permissions: PermissionSet) {
        self.inner.insert(user_id, Arc::new(permissions)).await;
    }
}

#[cfg(test)]
impl AuthUser {
    pub fn for_tests<I, S>(user_id: u64, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id,
            permissions: Arc::new(PermissionSet::new(permissions)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permissions::perm;

    #[test]
    fn self_access_needs_no_permission() {
        let user = AuthUser::for_tests(5, Vec::<String>::new());
        assert!(user.require_self_or(5, perm::LEAVE_VIEW).is_ok());
        assert!(matches!(
            user.require_self_or(6, perm::LEAVE_VIEW),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn user_filter_scoping() {
        let employee = AuthUser::for_tests(5, Vec::<String>::new());
        assert_eq!(employee.scope_user_filter(None, perm::LEAVE_VIEW).unwrap(), Some(5));
        assert!(employee.scope_user_filter(Some(9), perm::LEAVE_VIEW).is_err());

        let manager = AuthUser::for_tests(1, [perm::LEAVE_VIEW]);
        assert_eq!(manager.scope_user_filter(None, perm::LEAVE_VIEW).unwrap(), None);
        assert_eq!(manager.scope_user_filter(Some(9), perm::LEAVE_VIEW).unwrap(), Some(9));
    }

    #[actix_web::test]
    async fn cache_serves_inserted_entries() {
        let cache = PermissionCache::new(60);
        cache
            .inner
            .insert(4, Arc::new(PermissionSet::new(["leave.view"])))
            .await;
        assert!(cache.inner.get(&4).await.is_some());

        cache.invalidate(4).await;
        assert!(cache.inner.get(&4).await.is_none());
    }
}
