//! Row-level authorization: the per-table, per-operation predicate table,
//! evaluated by the store before every access. Pure functions, no I/O.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use casa_schema::Lead;
use casa_types::Role;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.into())
    }
}

/// The current identity plus its resolved role. `role: None` means the
/// identity has no profile; every lead access is denied for it.
#[derive(Clone, Copy, Debug)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Option<Role>,
}

impl Caller {
    pub fn new(user_id: Uuid, role: Option<Role>) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Profile read: any authenticated caller.
pub fn can_read_profile(_caller: &Caller) -> Decision {
    Decision::Allow
}

/// Profile update: only the row's own identity.
pub fn can_update_profile(caller: &Caller, profile_user: Uuid) -> Decision {
    if caller.user_id == profile_user {
        Decision::Allow
    } else {
        Decision::deny("profile belongs to another identity")
    }
}

/// Role changes are not self-service; admin only.
pub fn can_change_role(caller: &Caller) -> Decision {
    if caller.is_admin() {
        Decision::Allow
    } else {
        Decision::deny("role changes require admin")
    }
}

/// Lead read: any resolved role (admin, agent, viewer).
pub fn can_read_leads(caller: &Caller) -> Decision {
    match caller.role {
        Some(_) => Decision::Allow,
        None => Decision::deny("caller has no role"),
    }
}

/// Lead insert: admin or agent.
pub fn can_insert_lead(caller: &Caller) -> Decision {
    match caller.role {
        Some(Role::Admin) | Some(Role::Agent) => Decision::Allow,
        Some(Role::Viewer) => Decision::deny("viewers cannot create leads"),
        None => Decision::deny("caller has no role"),
    }
}

/// Lead update: admin, or the creator, or the current assignee. A lead with
/// null creator and null assignee is writable only by admin.
pub fn can_update_lead(caller: &Caller, lead: &Lead) -> Decision {
    if caller.is_admin() {
        return Decision::Allow;
    }
    if lead.created_by == Some(caller.user_id) || lead.assigned_to == Some(caller.user_id) {
        return Decision::Allow;
    }
    Decision::deny("caller is neither admin, creator, nor assignee")
}

/// Lead delete: admin only.
pub fn can_delete_lead(caller: &Caller) -> Decision {
    if caller.is_admin() {
        Decision::Allow
    } else {
        Decision::deny("only admin can delete leads")
    }
}

/// Activity read follows read access to the parent lead.
pub fn can_read_activities(caller: &Caller) -> Decision {
    can_read_leads(caller)
}

/// Activity insert follows write access to the parent lead.
pub fn can_insert_activity(caller: &Caller, lead: &Lead) -> Decision {
    can_update_lead(caller, lead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casa_schema::NewLead;
    use casa_types::{LeadSource, LeadStatus};
    use chrono::Utc;

    fn lead(created_by: Option<Uuid>, assigned_to: Option<Uuid>) -> Lead {
        let draft = NewLead::new("Jane", "Doe", "jane@example.com");
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            created_by,
            assigned_to,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone: None,
            budget_min: None,
            budget_max: None,
            preferred_areas: Vec::new(),
            property_type: None,
            bedrooms: None,
            bathrooms: None,
            status: LeadStatus::default(),
            source: LeadSource::default(),
            priority: 3,
            notes: None,
            last_contacted_at: None,
            next_follow_up: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(role: Option<Role>) -> Caller {
        Caller::new(Uuid::new_v4(), role)
    }

    #[test]
    fn any_role_reads_leads() {
        for role in [Role::Admin, Role::Agent, Role::Viewer] {
            assert!(can_read_leads(&caller(Some(role))).is_allowed());
        }
        assert!(!can_read_leads(&caller(None)).is_allowed());
    }

    #[test]
    fn only_admin_and_agent_insert() {
        assert!(can_insert_lead(&caller(Some(Role::Admin))).is_allowed());
        assert!(can_insert_lead(&caller(Some(Role::Agent))).is_allowed());
        assert!(!can_insert_lead(&caller(Some(Role::Viewer))).is_allowed());
        assert!(!can_insert_lead(&caller(None)).is_allowed());
    }

    #[test]
    fn creator_and_assignee_can_update() {
        let creator = caller(Some(Role::Agent));
        let assignee = caller(Some(Role::Agent));
        let bystander = caller(Some(Role::Agent));
        let row = lead(Some(creator.user_id), Some(assignee.user_id));

        assert!(can_update_lead(&creator, &row).is_allowed());
        assert!(can_update_lead(&assignee, &row).is_allowed());
        assert!(!can_update_lead(&bystander, &row).is_allowed());
        assert!(can_update_lead(&caller(Some(Role::Admin)), &row).is_allowed());
    }

    #[test]
    fn orphaned_lead_writable_only_by_admin() {
        let row = lead(None, None);
        assert!(can_update_lead(&caller(Some(Role::Admin)), &row).is_allowed());
        assert!(!can_update_lead(&caller(Some(Role::Agent)), &row).is_allowed());
        assert!(!can_update_lead(&caller(Some(Role::Viewer)), &row).is_allowed());
    }

    #[test]
    fn delete_is_admin_only() {
        assert!(can_delete_lead(&caller(Some(Role::Admin))).is_allowed());
        for role in [Some(Role::Agent), Some(Role::Viewer), None] {
            assert!(!can_delete_lead(&caller(role)).is_allowed());
        }
    }

    #[test]
    fn profile_update_is_self_only() {
        let me = caller(Some(Role::Viewer));
        assert!(can_update_profile(&me, me.user_id).is_allowed());
        assert!(!can_update_profile(&me, Uuid::new_v4()).is_allowed());
        assert!(can_read_profile(&me).is_allowed());
    }

    #[test]
    fn activity_rules_follow_parent_lead() {
        let creator = caller(Some(Role::Agent));
        let viewer = caller(Some(Role::Viewer));
        let row = lead(Some(creator.user_id), None);

        assert!(can_insert_activity(&creator, &row).is_allowed());
        assert!(!can_insert_activity(&viewer, &row).is_allowed());
        assert!(can_read_activities(&viewer).is_allowed());
        assert!(!can_read_activities(&caller(None)).is_allowed());
    }
}
