use crate::{
    api::{attendance, change_request, leave_request, profile, role, settings, work_report},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiters, built once so every worker shares the same buckets.
#[derive(Clone)]
pub struct Limiters {
    protected: Limiter,
    check_in: Limiter,
}

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min}/min"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            protected: build_limiter(config.rate_protected_per_min)?,
            check_in: build_limiter(config.rate_checkin_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    // /attendance/check-in, /attendance/check-out
                    .service(
                        web::resource("/check-in")
                            .wrap(limiters.check_in.clone())
                            .route(web::post().to(attendance::check_in)),
                    )
                    .service(
                        web::resource("/check-out")
                            .wrap(limiters.check_in.clone())
                            .route(web::post().to(attendance::check_out)),
                    )
                    .service(
                        web::resource("/current").route(web::get().to(attendance::current_session)),
                    )
                    .service(web::resource("/stats").route(web::get().to(attendance::attendance_stats)))
                    .service(
                        web::resource("/export").route(web::get().to(attendance::export_attendance)),
                    ),
            )
            .service(
                web::scope("/leave")
                    // /leave
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // /leave/{id}
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    )
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::put().to(leave_request::cancel_leave)),
                    ),
            )
            .service(
                web::scope("/reports")
                    .service(
                        web::resource("")
                            .route(web::get().to(work_report::list_reports))
                            .route(web::post().to(work_report::create_report)),
                    )
                    .service(web::resource("/{id}").route(web::get().to(work_report::get_report)))
                    .service(
                        web::resource("/{id}/review").route(web::put().to(work_report::review_report)),
                    ),
            )
            .service(
                web::scope("/change-requests")
                    .service(
                        web::resource("")
                            .route(web::get().to(change_request::list_change_requests))
                            .route(web::post().to(change_request::create_change_request)),
                    )
                    .service(
                        web::resource("/{id}").route(web::get().to(change_request::get_change_request)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(change_request::approve_change_request)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(change_request::reject_change_request)),
                    ),
            )
            .service(
                web::scope("/roles")
                    .service(
                        web::resource("")
                            .route(web::get().to(role::list_roles))
                            .route(web::post().to(role::create_role)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(role::get_role))
                            .route(web::put().to(role::update_role))
                            .route(web::delete().to(role::delete_role)),
                    ),
            )
            .service(
                web::scope("/profiles")
                    .service(web::resource("/me").route(web::get().to(profile::my_profile)))
                    .service(web::resource("/org-chart").route(web::get().to(profile::org_chart)))
                    .service(web::resource("/{id}/role").route(web::put().to(role::assign_role))),
            )
            .service(
                web::resource("/settings")
                    .route(web::get().to(settings::get_settings))
                    .route(web::put().to(settings::update_settings)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::auth::PermissionCache;
    use crate::auth::jwt::testing::issue_token;
    use crate::auth::permissions::{PermissionSet, perm};
    use crate::models::TokenType;
    use crate::services::email::EmailService;
    use crate::services::settings::SettingsService;
    use actix_web::http::StatusCode;
    use actix_web::web::Data;
    use actix_web::{App, test as actix_test};
    use sqlx::mysql::MySqlPoolOptions;

    const SECRET: &str = "routes-secret";

    // The pool never connects: every request below is decided before a query runs.
    macro_rules! app {
        ($user:expr, $perms:expr) => {{
            let config = Config::for_tests(SECRET);
            let limiters = Limiters::from_config(&config).unwrap();
            let pool = MySqlPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap();
            let cache = PermissionCache::new(60);
            cache.seed($user, PermissionSet::new($perms)).await;

            actix_test::init_service(
                App::new()
                    .app_data(Data::new(pool.clone()))
                    .app_data(Data::new(config.clone()))
                    .app_data(Data::new(cache))
                    .app_data(Data::new(SettingsService::new(pool.clone(), 60)))
                    .app_data(Data::new(EmailService::new(pool, None)))
                    .configure(|cfg| configure(cfg, &config, &limiters)),
            )
            .await
        }};
    }

    fn get(uri: &str, user_id: u64) -> actix_test::TestRequest {
        let token = issue_token(user_id, TokenType::Access, SECRET, 600);
        actix_test::TestRequest::get()
            .uri(uri)
            .peer_addr("10.0.0.5:40000".parse().unwrap())
            .insert_header(("Authorization", format!("Bearer {token}")))
    }

    #[actix_web::test]
    async fn protected_scope_requires_a_token() {
        let app = app!(7, Vec::<String>::new());
        let req = actix_test::TestRequest::get()
            .uri("/api/roles")
            .peer_addr("10.0.0.5:40000".parse().unwrap())
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn missing_permission_is_forbidden() {
        let app = app!(7, [perm::ATTENDANCE_VIEW]);

        let resp = actix_test::call_service(&app, get("/api/roles", 7).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = actix_test::call_service(&app, get("/api/settings", 7).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // export needs attendance.export on top of attendance.view
        let resp = actix_test::call_service(
            &app,
            get("/api/attendance/export?from=2026-10-01&to=2026-10-31", 7).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // stats of another user need attendance.view
        let app = app!(8, Vec::<String>::new());
        let resp = actix_test::call_service(
            &app,
            get("/api/attendance/stats?month=2026-10&user_id=7", 8).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn inverted_export_range_is_a_bad_request() {
        let app = app!(7, [perm::ATTENDANCE_VIEW, perm::ATTENDANCE_EXPORT]);
        let resp = actix_test::call_service(
            &app,
            get("/api/attendance/export?from=2026-10-31&to=2026-10-01", 7).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["error"], "from cannot be after to");
    }

    #[test]
    fn limiter_accepts_extreme_rates() {
        assert!(build_limiter(0).is_ok());
        assert!(build_limiter(1).is_ok());
        assert!(build_limiter(120_000).is_ok());
    }
}
