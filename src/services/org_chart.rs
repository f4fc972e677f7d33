use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::role::Profile;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrgNode {
    pub id: u64,
    pub full_name: String,
    pub department: Option<String>,
    pub reports: Vec<OrgNode>,
}

/// Builds the reporting forest from `manager_id` links. Profiles whose
/// manager is missing become roots; profiles caught in a manager cycle are
/// attached as roots once so nothing is dropped.
pub fn build_org_chart(profiles: &[Profile]) -> Vec<OrgNode> {
    let known: HashSet<u64> = profiles.iter().map(|p| p.id).collect();
    let mut children: HashMap<u64, Vec<&Profile>> = HashMap::new();
    let mut roots = Vec::new();

    for p in profiles {
        match p.manager_id {
            Some(m) if m != p.id && known.contains(&m) => children.entry(m).or_default().push(p),
            _ => roots.push(p),
        }
    }

    let mut visited = HashSet::new();
    let mut forest: Vec<OrgNode> = roots
        .into_iter()
        .map(|p| build_node(p, &children, &mut visited))
        .collect();

    for p in profiles {
        if !visited.contains(&p.id) {
            forest.push(build_node(p, &children, &mut visited));
        }
    }

    forest
}

fn build_node(
    profile: &Profile,
    children: &HashMap<u64, Vec<&Profile>>,
    visited: &mut HashSet<u64>,
) -> OrgNode {
    visited.insert(profile.id);

    let mut reports = Vec::new();
    if let Some(kids) = children.get(&profile.id) {
        for kid in kids {
            if !visited.contains(&kid.id) {
                reports.push(build_node(kid, children, visited));
            }
        }
    }

    OrgNode {
        id: profile.id,
        full_name: profile.full_name.clone(),
        department: profile.department.clone(),
        reports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: u64, manager_id: Option<u64>) -> Profile {
        Profile {
            id,
            full_name: format!("Person {id}"),
            email: format!("p{id}@company.com"),
            department: None,
            role_id: None,
            manager_id,
        }
    }

    #[test]
    fn builds_tree_from_manager_links() {
        let chart = build_org_chart(&[
            profile(1, None),
            profile(2, Some(1)),
            profile(3, Some(1)),
            profile(4, Some(2)),
        ]);

        assert_eq!(chart.len(), 1);
        assert_eq!(chart[0].id, 1);
        assert_eq!(chart[0].reports.len(), 2);
        assert_eq!(chart[0].reports[0].reports[0].id, 4);
    }

    #[test]
    fn unknown_manager_becomes_root() {
        let chart = build_org_chart(&[profile(1, None), profile(2, Some(99))]);
        assert_eq!(chart.len(), 2);
    }

    #[test]
    fn cycles_do_not_loop_or_drop_people() {
        let chart = build_org_chart(&[profile(1, Some(2)), profile(2, Some(1)), profile(3, Some(3))]);

        fn count(nodes: &[OrgNode]) -> usize {
            nodes.iter().map(|n| 1 + count(&n.reports)).sum()
        }
        assert_eq!(count(&chart), 3);
    }
}
