//! Company settings, cached in-process and turned into the explicit
//! [`ScheduleBounds`] / [`LocationPolicy`] values the rest of the crate uses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use moka::future::Cache;
use sqlx::MySqlPool;
use sqlx::types::Json;

use crate::error::{AppError, AppResult};
use crate::model::settings::{CompanySettings, CompanySettingsRow};
use crate::services::location::LocationPolicy;
use crate::services::schedule::ScheduleBounds;

const SETTINGS_ROW_ID: u8 = 1;

/// Parsed view of [`CompanySettings`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub settings: CompanySettings,
    pub bounds: ScheduleBounds,
    pub location: LocationPolicy,
    pub late_grace_minutes: i64,
}

impl Policy {
    pub fn from_settings(settings: CompanySettings) -> AppResult<Self> {
        let bounds = ScheduleBounds::parse(
            &settings.work_start,
            &settings.lunch_start,
            &settings.lunch_end,
            &settings.work_end,
            settings.utc_offset_minutes,
        )?;

        if settings.late_grace_minutes < 0 {
            return Err(AppError::validation("late_grace_minutes cannot be negative"));
        }
        if settings.office_radius_meters <= 0.0 || !settings.office_radius_meters.is_finite() {
            return Err(AppError::validation("office_radius_meters must be positive"));
        }
        if settings.office_latitude.is_some() != settings.office_longitude.is_some() {
            return Err(AppError::validation(
                "office_latitude and office_longitude must be set together",
            ));
        }

        let location = LocationPolicy {
            office_latitude: settings.office_latitude,
            office_longitude: settings.office_longitude,
            radius_meters: settings.office_radius_meters,
            wifi_allowlist: settings.wifi_allowlist.clone(),
        };

        Ok(Self {
            late_grace_minutes: settings.late_grace_minutes as i64,
            settings,
            bounds,
            location,
        })
    }
}

#[derive(Clone)]
pub struct SettingsService {
    pool: MySqlPool,
    cache: Cache<u8, Arc<Policy>>,
}

impl SettingsService {
    pub fn new(pool: MySqlPool, ttl_secs: u64) -> Self {
        Self {
            pool,
            cache: Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(ttl_secs))
                .build(),
        }
    }

    pub async fn current(&self) -> AppResult<Arc<Policy>> {
        if let Some(hit) = self.cache.get(&SETTINGS_ROW_ID).await {
            return Ok(hit);
        }

        let row = sqlx::query_as::<_, CompanySettingsRow>(
            r#"
            SELECT work_start, lunch_start, lunch_end, work_end, utc_offset_minutes,
                   late_grace_minutes, office_latitude, office_longitude,
                   office_radius_meters, wifi_allowlist
            FROM company_settings
            WHERE id = ?
            "#,
        )
        .bind(SETTINGS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Internal("company_settings row is missing".into()))?;

        let policy = Arc::new(Policy::from_settings(row.into())?);
        self.cache.insert(SETTINGS_ROW_ID, policy.clone()).await;
        Ok(policy)
    }

    pub async fn update(&self, settings: CompanySettings) -> AppResult<Arc<Policy>> {
        let policy = Policy::from_settings(settings)?;
        let s = &policy.settings;

        sqlx::query(
            r#"
            UPDATE company_settings
            SET work_start = ?, lunch_start = ?, lunch_end = ?, work_end = ?,
                utc_offset_minutes = ?, late_grace_minutes = ?,
                office_latitude = ?, office_longitude = ?, office_radius_meters = ?,
                wifi_allowlist = ?
            WHERE id = ?
            "#,
        )
        .bind(&s.work_start)
        .bind(&s.lunch_start)
        .bind(&s.lunch_end)
        .bind(&s.work_end)
        .bind(s.utc_offset_minutes)
        .bind(s.late_grace_minutes)
        .bind(s.office_latitude)
        .bind(s.office_longitude)
        .bind(s.office_radius_meters)
        .bind(Json(s.wifi_allowlist.clone()))
        .bind(SETTINGS_ROW_ID)
        .execute(&self.pool)
        .await?;

        self.cache.invalidate(&SETTINGS_ROW_ID).await;

        Ok(Arc::new(policy))
    }

    /// Company bounds with the user's approved schedule change for `date`, if any.
    pub async fn bounds_for(&self, user_id: u64, date: NaiveDate) -> AppResult<ScheduleBounds> {
        let policy = self.current().await?;
        let overrides = load_overrides(&self.pool, user_id, date, date).await?;
        Ok(apply_override(&policy.bounds, overrides.first().map(|o| (o.1, o.2))))
    }
}

/// `(work_date, work_start, work_end)` rows for a user in a date range.
pub async fn load_overrides(
    pool: &MySqlPool,
    user_id: u64,
    from: NaiveDate,
    to: NaiveDate,
) -> AppResult<Vec<(NaiveDate, NaiveTime, NaiveTime)>> {
    Ok(sqlx::query_as::<_, (NaiveDate, NaiveTime, NaiveTime)>(
        r#"
        SELECT work_date, work_start, work_end
        FROM schedule_overrides
        WHERE user_id = ? AND work_date BETWEEN ? AND ?
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?)
}

/// An override that no longer fits the company lunch window is ignored.
pub fn apply_override(
    base: &ScheduleBounds,
    schedule_override: Option<(NaiveTime, NaiveTime)>,
) -> ScheduleBounds {
    match schedule_override {
        Some((start, end)) => base.with_override(start, end).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring schedule override incompatible with lunch window");
            *base
        }),
        None => *base,
    }
}

#[cfg(test)]
pub(crate) fn sample_settings() -> CompanySettings {
    CompanySettings {
        work_start: "08:30".into(),
        lunch_start: "12:00".into(),
        lunch_end: "13:30".into(),
        work_end: "17:30".into(),
        utc_offset_minutes: 420,
        late_grace_minutes: 5,
        office_latitude: Some(10.7769),
        office_longitude: Some(106.7009),
        office_radius_meters: 200.0,
        wifi_allowlist: vec!["192.168.10.0/24".into()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::schedule::parse_wall_clock;

    #[test]
    fn policy_from_valid_settings() {
        let policy = Policy::from_settings(sample_settings()).unwrap();
        assert_eq!(policy.bounds.standard_day_minutes(), 450);
        assert_eq!(policy.late_grace_minutes, 5);
        assert_eq!(policy.location.wifi_allowlist.len(), 1);
    }

    #[test]
    fn policy_rejects_bad_settings() {
        let mut s = sample_settings();
        s.lunch_end = "11:00".into();
        assert!(Policy::from_settings(s).is_err());

        let mut s = sample_settings();
        s.office_longitude = None;
        assert!(Policy::from_settings(s).is_err());

        let mut s = sample_settings();
        s.office_radius_meters = 0.0;
        assert!(Policy::from_settings(s).is_err());

        let mut s = sample_settings();
        s.utc_offset_minutes = 24 * 60;
        assert!(Policy::from_settings(s).is_err());
    }

    #[test]
    fn override_application() {
        let base = Policy::from_settings(sample_settings()).unwrap().bounds;

        let moved = apply_override(
            &base,
            Some((parse_wall_clock("10:00").unwrap(), parse_wall_clock("19:00").unwrap())),
        );
        assert_eq!(moved.work_start, parse_wall_clock("10:00").unwrap());

        let ignored = apply_override(
            &base,
            Some((parse_wall_clock("13:00").unwrap(), parse_wall_clock("19:00").unwrap())),
        );
        assert_eq!(ignored, base);
        assert_eq!(apply_override(&base, None), base);
    }
}
