use std::collections::{HashMap, HashSet};

use crate::domain::budget::DepartmentId;

/// Authorization collaborator consulted before approval commands are
/// applied. The workflow treats this as an external capability check; it
/// never inspects roles itself.
pub trait ApprovalAuthority: Send + Sync {
    /// Manager-level (level 1) approval capability.
    fn can_approve_level1(&self, user_id: &str) -> bool;
    /// Finance-level (level 2) approval capability.
    fn can_approve_level2(&self, user_id: &str) -> bool;
    /// Whether the user manages the given department.
    fn is_department_manager(&self, user_id: &str, department_id: &DepartmentId) -> bool;
    /// Administrators may cancel any request.
    fn is_admin(&self, user_id: &str) -> bool;
}

/// Fixed-assignment authority backed by in-memory sets, for tests and
/// embedding contexts where roles are known up front.
#[derive(Clone, Debug, Default)]
pub struct StaticAuthority {
    level1_approvers: HashSet<String>,
    level2_approvers: HashSet<String>,
    department_managers: HashMap<String, HashSet<String>>,
    admins: HashSet<String>,
}

impl StaticAuthority {
    pub fn with_level1_approvers(mut self, user_ids: Vec<String>) -> Self {
        self.level1_approvers.extend(user_ids.into_iter().map(|id| normalize_key(&id)));
        self
    }

    pub fn with_level2_approvers(mut self, user_ids: Vec<String>) -> Self {
        self.level2_approvers.extend(user_ids.into_iter().map(|id| normalize_key(&id)));
        self
    }

    pub fn with_department_manager(
        mut self,
        department_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        self.department_managers
            .entry(normalize_key(&department_id.into()))
            .or_default()
            .insert(normalize_key(&user_id.into()));
        self
    }

    pub fn with_admins(mut self, user_ids: Vec<String>) -> Self {
        self.admins.extend(user_ids.into_iter().map(|id| normalize_key(&id)));
        self
    }
}

impl ApprovalAuthority for StaticAuthority {
    fn can_approve_level1(&self, user_id: &str) -> bool {
        self.level1_approvers.contains(&normalize_key(user_id))
    }

    fn can_approve_level2(&self, user_id: &str) -> bool {
        self.level2_approvers.contains(&normalize_key(user_id))
    }

    fn is_department_manager(&self, user_id: &str, department_id: &DepartmentId) -> bool {
        self.department_managers
            .get(&normalize_key(&department_id.0))
            .is_some_and(|managers| managers.contains(&normalize_key(user_id)))
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admins.contains(&normalize_key(user_id))
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{ApprovalAuthority, StaticAuthority};
    use crate::domain::budget::DepartmentId;

    fn authority() -> StaticAuthority {
        StaticAuthority::default()
            .with_level1_approvers(vec!["u-manager".to_string()])
            .with_level2_approvers(vec!["u-finance".to_string()])
            .with_department_manager("engineering", "u-eng-lead")
            .with_admins(vec!["u-admin".to_string()])
    }

    #[test]
    fn capabilities_are_independent() {
        let authority = authority();

        assert!(authority.can_approve_level1("u-manager"));
        assert!(!authority.can_approve_level2("u-manager"));
        assert!(authority.can_approve_level2("u-finance"));
        assert!(!authority.can_approve_level1("u-finance"));
    }

    #[test]
    fn department_manager_is_scoped_to_its_department() {
        let authority = authority();
        let engineering = DepartmentId("engineering".to_string());
        let marketing = DepartmentId("marketing".to_string());

        assert!(authority.is_department_manager("u-eng-lead", &engineering));
        assert!(!authority.is_department_manager("u-eng-lead", &marketing));
        assert!(!authority.is_department_manager("u-manager", &engineering));
    }

    #[test]
    fn lookups_ignore_case_and_surrounding_whitespace() {
        let authority = authority();

        assert!(authority.can_approve_level1("  U-Manager "));
        assert!(authority.is_admin("U-ADMIN"));
        assert!(!authority.is_admin("u-manager"));
    }
}
