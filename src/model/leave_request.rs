use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LeaveType {
    FullDay,
    HalfDay,
    Partial,
}

impl LeaveType {
    /// Hours booked for this leave. `full_day` and `half_day` derive from the
    /// standard day, `partial` takes the requested hours, strictly between 0
    /// and a full day.
    pub fn duration_hours(self, requested: Option<f64>, standard_day_minutes: i64) -> AppResult<f64> {
        let full = standard_day_minutes as f64 / 60.0;
        match self {
            LeaveType::FullDay => Ok(full),
            LeaveType::HalfDay => Ok(full / 2.0),
            LeaveType::Partial => {
                let hours = requested
                    .ok_or_else(|| AppError::validation("duration_hours is required for partial leave"))?;
                if !hours.is_finite() || hours <= 0.0 || hours >= full {
                    return Err(AppError::validation(format!(
                        "Partial leave must be between 0 and {full} hours"
                    )));
                }
                Ok(hours)
            }
        }
    }
}

/// Shared by leave requests, work reports and change requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 42)]
    pub user_id: u64,
    #[schema(example = "2026-11-02", value_type = String, format = "date")]
    pub leave_date: NaiveDate,
    #[schema(example = "full_day")]
    pub leave_type: String,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(example = 7.5)]
    pub duration_hours: f64,
    pub reason: Option<String>,
    pub reviewer_id: Option<u64>,
    #[schema(example = "2026-10-19T01:30:00Z", value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_follow_the_standard_day() {
        assert_eq!(LeaveType::FullDay.duration_hours(Some(2.0), 450).unwrap(), 7.5);
        assert_eq!(LeaveType::HalfDay.duration_hours(None, 450).unwrap(), 3.75);
        assert_eq!(LeaveType::Partial.duration_hours(Some(2.0), 450).unwrap(), 2.0);
    }

    #[test]
    fn partial_leave_bounds() {
        assert!(LeaveType::Partial.duration_hours(None, 450).is_err());
        assert!(LeaveType::Partial.duration_hours(Some(0.0), 450).is_err());
        assert!(LeaveType::Partial.duration_hours(Some(7.5), 450).is_err());
        assert!(LeaveType::Partial.duration_hours(Some(f64::NAN), 450).is_err());
    }

    #[test]
    fn status_strings() {
        assert_eq!(RequestStatus::Cancelled.as_ref(), "cancelled");
        assert_eq!("half_day".parse::<LeaveType>().unwrap(), LeaveType::HalfDay);
    }
}
