pub mod attendance;
pub mod email;
pub mod location;
pub mod org_chart;
pub mod report;
pub mod schedule;
pub mod settings;
