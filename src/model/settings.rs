use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompanySettingsRow {
    pub work_start: String,
    pub lunch_start: String,
    pub lunch_end: String,
    pub work_end: String,
    pub utc_offset_minutes: i32,
    pub late_grace_minutes: i32,
    pub office_latitude: Option<f64>,
    pub office_longitude: Option<f64>,
    pub office_radius_meters: f64,
    pub wifi_allowlist: Json<Vec<String>>,
}

/// Company-wide work-hour and check-in policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompanySettings {
    #[schema(example = "08:30")]
    pub work_start: String,
    #[schema(example = "12:00")]
    pub lunch_start: String,
    #[schema(example = "13:30")]
    pub lunch_end: String,
    #[schema(example = "17:30")]
    pub work_end: String,
    /// Organisational offset from UTC, e.g. 420 for UTC+7
    #[schema(example = 420)]
    pub utc_offset_minutes: i32,
    #[schema(example = 5)]
    pub late_grace_minutes: i32,
    #[schema(example = 10.7769)]
    pub office_latitude: Option<f64>,
    #[schema(example = 106.7009)]
    pub office_longitude: Option<f64>,
    #[schema(example = 200.0)]
    pub office_radius_meters: f64,
    #[schema(example = json!(["203.0.113.7", "192.168.10.0/24"]))]
    pub wifi_allowlist: Vec<String>,
}

impl From<CompanySettingsRow> for CompanySettings {
    fn from(row: CompanySettingsRow) -> Self {
        Self {
            work_start: row.work_start,
            lunch_start: row.lunch_start,
            lunch_end: row.lunch_end,
            work_end: row.work_end,
            utc_offset_minutes: row.utc_offset_minutes,
            late_grace_minutes: row.late_grace_minutes,
            office_latitude: row.office_latitude,
            office_longitude: row.office_longitude,
            office_radius_meters: row.office_radius_meters,
            wifi_allowlist: row.wifi_allowlist.0,
        }
    }
}
