use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Leave,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceLog {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub user_id: u64,
    #[schema(example = "2026-10-19", value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(example = "2026-10-19T01:30:00Z", value_type = String, format = "date-time")]
    pub check_in_time: DateTime<Utc>,
    #[schema(example = "2026-10-19T12:00:00Z", value_type = String, format = "date-time", nullable = true)]
    pub check_out_time: Option<DateTime<Utc>>,
    #[schema(example = "present")]
    pub status: String,
    #[schema(example = 0)]
    pub late_minutes: i32,
    #[schema(example = "gps")]
    pub check_in_method: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip_address: Option<String>,
}

impl AttendanceLog {
    pub fn is_open(&self) -> bool {
        self.check_out_time.is_none()
    }
}

/// Fields written when a session is opened.
#[derive(Debug, Clone)]
pub struct NewAttendanceLog {
    pub user_id: u64,
    pub work_date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub late_minutes: i32,
    pub check_in_method: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip_address: Option<String>,
}
