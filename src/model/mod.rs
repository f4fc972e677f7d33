pub mod attendance;
pub mod change_request;
pub mod leave_request;
pub mod role;
pub mod settings;
pub mod work_report;
