use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

/// What an approved change request does when applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangePayload {
    /// Correct the times of one of the requester's attendance logs.
    AttendanceEdit {
        attendance_id: u64,
        #[schema(value_type = String, format = "date-time")]
        check_in_time: DateTime<Utc>,
        #[schema(value_type = Option<String>, format = "date-time")]
        check_out_time: Option<DateTime<Utc>>,
    },
    /// Move the start/end of one work day (`HH:MM`), lunch stays put.
    ScheduleChange {
        #[schema(value_type = String, format = "date")]
        work_date: NaiveDate,
        #[schema(example = "10:00")]
        work_start: String,
        #[schema(example = "19:00")]
        work_end: String,
    },
}

impl ChangePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangePayload::AttendanceEdit { .. } => "attendance_edit",
            ChangePayload::ScheduleChange { .. } => "schedule_change",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChangeRequestRow {
    pub id: u64,
    pub user_id: u64,
    pub kind: String,
    pub payload: Json<ChangePayload>,
    pub reason: Option<String>,
    pub status: String,
    pub reviewer_id: Option<u64>,
    pub reviewer_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChangeRequest {
    pub id: u64,
    pub user_id: u64,
    #[schema(example = "attendance_edit")]
    pub kind: String,
    pub payload: ChangePayload,
    pub reason: Option<String>,
    #[schema(example = "pending")]
    pub status: String,
    pub reviewer_id: Option<u64>,
    pub reviewer_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl From<ChangeRequestRow> for ChangeRequest {
    fn from(row: ChangeRequestRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            kind: row.kind,
            payload: row.payload.0,
            reason: row.reason,
            status: row.status,
            reviewer_id: row.reviewer_id,
            reviewer_note: row.reviewer_note,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_is_tagged_by_kind() {
        let payload: ChangePayload = serde_json::from_value(json!({
            "kind": "schedule_change",
            "work_date": "2026-10-20",
            "work_start": "10:00",
            "work_end": "19:00"
        }))
        .unwrap();

        assert_eq!(payload.kind(), "schedule_change");
        assert!(matches!(payload, ChangePayload::ScheduleChange { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = serde_json::from_value::<ChangePayload>(json!({"kind": "shift_swap"}));
        assert!(result.is_err());
    }
}
