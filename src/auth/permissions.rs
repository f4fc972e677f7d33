//! Permission strings follow `<resource>.<action>`. Holding `<resource>.view`
//! is a precondition for every other action on the same resource, and the
//! single entry `*` grants everything.

use std::collections::BTreeSet;

pub const WILDCARD: &str = "*";

pub mod perm {
    pub const ATTENDANCE_VIEW: &str = "attendance.view";
    pub const ATTENDANCE_EXPORT: &str = "attendance.export";
    pub const LEAVE_VIEW: &str = "leave.view";
    pub const LEAVE_APPROVE: &str = "leave.approve";
    pub const REPORTS_VIEW: &str = "reports.view";
    pub const REPORTS_REVIEW: &str = "reports.review";
    pub const CHANGE_REQUESTS_VIEW: &str = "change_requests.view";
    pub const CHANGE_REQUESTS_APPROVE: &str = "change_requests.approve";
    pub const ROLES_VIEW: &str = "roles.view";
    pub const ROLES_MANAGE: &str = "roles.manage";
    pub const SETTINGS_VIEW: &str = "settings.view";
    pub const SETTINGS_MANAGE: &str = "settings.manage";
    pub const EMPLOYEES_VIEW: &str = "employees.view";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    entries: BTreeSet<String>,
}

fn split(permission: &str) -> Option<(&str, &str)> {
    let (resource, action) = permission.split_once('.')?;
    if resource.is_empty() || action.is_empty() || action.contains('.') {
        return None;
    }
    Some((resource, action))
}

fn view_of(resource: &str) -> String {
    format!("{resource}.view")
}

impl PermissionSet {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|s| s.into().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.entries.contains(WILDCARD)
    }

    /// Effective check: the entry itself plus its `.view` gate.
    pub fn allows(&self, permission: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        let Some((resource, action)) = split(permission) else {
            return false;
        };
        if !self.entries.contains(&view_of(resource)) {
            return false;
        }
        action == "view" || self.entries.contains(permission)
    }

    /// Entries that are malformed or lack their `.view` gate, in sorted order.
    pub fn violations(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.as_str() != WILDCARD)
            .filter_map(|entry| match split(entry) {
                None => Some(format!("'{entry}' is not of the form resource.action")),
                Some((resource, _)) if !self.entries.contains(&view_of(resource)) => Some(
                    format!("'{entry}' requires '{}'", view_of(resource)),
                ),
                Some(_) => None,
            })
            .collect()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.entries.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_gates_other_actions() {
        let set = PermissionSet::new(["leave.approve"]);
        assert!(!set.allows("leave.approve"));
        assert!(!set.allows("leave.view"));

        let set = PermissionSet::new(["leave.view", "leave.approve"]);
        assert!(set.allows("leave.approve"));
        assert!(set.allows("leave.view"));
        assert!(!set.allows("reports.view"));
    }

    #[test]
    fn wildcard_allows_everything() {
        let set = PermissionSet::new(["*"]);
        assert!(set.allows("settings.manage"));
        assert!(set.violations().is_empty());
    }

    #[test]
    fn violations_name_the_missing_gate() {
        let set = PermissionSet::new(["roles.manage", "attendance.view", "bogus", "a.b.c"]);
        let violations = set.violations();

        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| v.contains("'roles.manage' requires 'roles.view'")));
        assert!(violations.iter().any(|v| v.contains("'bogus'")));
    }

    #[test]
    fn entries_are_trimmed_and_deduplicated() {
        let set = PermissionSet::new([" leave.view ", "leave.view", ""]);
        assert_eq!(set.into_vec(), vec!["leave.view".to_string()]);
    }

    #[test]
    fn malformed_permission_is_never_allowed() {
        let set = PermissionSet::new(["leave.view"]);
        assert!(!set.allows("leave"));
        assert!(!set.allows(".view"));
    }
}
