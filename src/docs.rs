use crate::api::attendance::{
    AttendanceEntry, AttendanceListResponse, CheckInRequest, CheckOutResponse,
    CurrentSessionResponse,
};
use crate::api::change_request::{ChangeRequestListResponse, CreateChangeRequest, ReviewNote};
use crate::api::leave_request::{CreateLeave, LeaveListResponse};
use crate::api::role::{AssignRole, RolePayload};
use crate::api::work_report::{CreateReport, ReportListResponse, ReviewReport};
use crate::model::attendance::{AttendanceLog, AttendanceStatus};
use crate::model::change_request::{ChangePayload, ChangeRequest};
use crate::model::leave_request::{LeaveRequest, LeaveType, RequestStatus};
use crate::model::role::{Profile, Role};
use crate::model::settings::CompanySettings;
use crate::model::work_report::{ReportType, WorkReport};
use crate::models::MessageResponse;
use crate::services::location::CheckInMethod;
use crate::services::org_chart::OrgNode;
use crate::services::report::AttendanceSummary;
use crate::services::schedule::WorkBreakdown;
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance & HR Workflow API",
        version = "1.0.0",
        description = r#"
## Attendance, leave and work-report backend

### Key features
- **Attendance**: GPS or office-WiFi verified check-in/check-out, standard/overtime/break minutes, monthly statistics, CSV export
- **Leave**: full-day, half-day and partial leave with manager approval
- **Work reports**: daily, weekly and monthly reports with review notes
- **Change requests**: attendance corrections and per-day schedule changes, applied on approval
- **Roles**: permission strings `<resource>.<action>`, where `<resource>.view` gates every other action
- **Settings**: company work hours, lunch window, UTC offset, office location and WiFi allowlist

### Security
Every endpoint expects an access token issued by the identity provider as `Authorization: Bearer <token>`.
"#,
    ),
    paths(
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::current_session,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_stats,
        crate::api::attendance::export_attendance,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::work_report::create_report,
        crate::api::work_report::list_reports,
        crate::api::work_report::get_report,
        crate::api::work_report::review_report,

        crate::api::change_request::create_change_request,
        crate::api::change_request::list_change_requests,
        crate::api::change_request::get_change_request,
        crate::api::change_request::approve_change_request,
        crate::api::change_request::reject_change_request,

        crate::api::role::list_roles,
        crate::api::role::get_role,
        crate::api::role::create_role,
        crate::api::role::update_role,
        crate::api::role::delete_role,
        crate::api::role::assign_role,

        crate::api::profile::my_profile,
        crate::api::profile::org_chart,

        crate::api::settings::get_settings,
        crate::api::settings::update_settings
    ),
    components(
        schemas(
            AttendanceLog,
            AttendanceStatus,
            AttendanceEntry,
            AttendanceListResponse,
            AttendanceSummary,
            CheckInMethod,
            CheckInRequest,
            CheckOutResponse,
            CurrentSessionResponse,
            WorkBreakdown,
            LeaveRequest,
            LeaveType,
            RequestStatus,
            CreateLeave,
            LeaveListResponse,
            WorkReport,
            ReportType,
            CreateReport,
            ReviewReport,
            ReportListResponse,
            ChangePayload,
            ChangeRequest,
            CreateChangeRequest,
            ReviewNote,
            ChangeRequestListResponse,
            Role,
            RolePayload,
            AssignRole,
            Profile,
            OrgNode,
            CompanySettings,
            MessageResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Attendance", description = "Check-in/out, statistics and export"),
        (name = "Leave", description = "Leave requests and approvals"),
        (name = "Reports", description = "Work reports and reviews"),
        (name = "Change requests", description = "Attendance corrections and schedule changes"),
        (name = "Roles", description = "Roles and permission assignment"),
        (name = "Profiles", description = "Employee profiles and org chart"),
        (name = "Settings", description = "Company work-hour and location policy"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_secured_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/attendance/check-in"));
        assert!(doc.paths.paths.contains_key("/api/change-requests/{request_id}/approve"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("WorkBreakdown"));
    }
}
