use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportType {
    Daily,
    Weekly,
    Monthly,
}

impl ReportType {
    /// First day of the period `date` falls in: itself for daily, the Monday
    /// of its week for weekly, the 1st of its month for monthly.
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            ReportType::Daily => date,
            ReportType::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            ReportType::Monthly => date.with_day(1).unwrap_or(date),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct WorkReport {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub user_id: u64,
    #[schema(example = "2026-10-19", value_type = String, format = "date")]
    pub report_date: NaiveDate,
    #[schema(example = "daily")]
    pub report_type: String,
    pub content: String,
    #[schema(example = "pending")]
    pub status: String,
    pub reviewer_note: Option<String>,
    pub reviewer_id: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_start_normalisation() {
        // 2026-10-22 is a Thursday
        assert_eq!(ReportType::Daily.period_start(d(2026, 10, 22)), d(2026, 10, 22));
        assert_eq!(ReportType::Weekly.period_start(d(2026, 10, 22)), d(2026, 10, 19));
        assert_eq!(ReportType::Weekly.period_start(d(2026, 10, 19)), d(2026, 10, 19));
        assert_eq!(ReportType::Weekly.period_start(d(2026, 11, 1)), d(2026, 10, 26));
        assert_eq!(ReportType::Monthly.period_start(d(2026, 10, 22)), d(2026, 10, 1));
    }
}
