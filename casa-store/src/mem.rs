use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use casa_policy::{
    can_change_role, can_delete_lead, can_insert_activity, can_insert_lead, can_read_activities,
    can_read_leads, can_update_lead, can_update_profile, Caller, Decision,
};
use casa_schema::{Lead, LeadActivity, LeadPatch, NewActivity, NewLead, Profile};
use casa_types::Role;

use crate::{LeadFilter, LeadOrder, LeadStore, OrderField, Page, StoreError};

const DEFAULT_DISPLAY_NAME: &str = "New User";

/// In-memory reference store.
///
/// Runs the policy table before every operation and the write hooks that
/// replace the source system's database triggers: `updated_at` is
/// unconditionally rewritten on every profile/lead update (no-op updates
/// included), and identity registration provisions exactly one profile.
///
/// NOTE: not durable; last-write-wins between concurrent callers, no
/// optimistic-concurrency token.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, Profile>,
    leads: HashMap<Uuid, Lead>,
    activities: Vec<LeadActivity>,
}

impl Inner {
    /// Role resolution: pure lookup, no side effects, never recurses into
    /// the policy table.
    fn caller(&self, user_id: Uuid) -> Caller {
        Caller::new(user_id, self.profiles.get(&user_id).map(|p| p.role))
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Bootstrap a store with one admin profile. Every identity registered
    /// afterwards provisions as agent; role changes go through `set_role`.
    pub fn with_admin(admin: Uuid, display_name: &str) -> Self {
        let now = Utc::now();
        let mut profiles = HashMap::new();
        profiles.insert(
            admin,
            Profile {
                user_id: admin,
                display_name: display_name.to_string(),
                role: Role::Admin,
                created_at: now,
                updated_at: now,
            },
        );
        Self {
            inner: Mutex::new(Inner {
                profiles,
                ..Default::default()
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_denied(decision: Decision) -> Result<(), StoreError> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(StoreError::AccessDenied(reason)),
    }
}

/// Denied reads are reported as absence.
fn read_denied(decision: Decision) -> Result<(), StoreError> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(_) => Err(StoreError::NotFound),
    }
}

fn matches_filter(lead: &Lead, filter: &LeadFilter) -> bool {
    if let Some(status) = filter.status {
        if lead.status != status {
            return false;
        }
    }
    if let Some(source) = filter.source {
        if lead.source != source {
            return false;
        }
    }
    if let Some(assignee) = filter.assigned_to {
        if lead.assigned_to != Some(assignee) {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = lead.first_name.to_lowercase().contains(&needle)
            || lead.last_name.to_lowercase().contains(&needle)
            || lead.email.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

fn sort_leads(leads: &mut [Lead], order: LeadOrder) {
    leads.sort_by(|a, b| {
        let ord = match order.field {
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            OrderField::Priority => a.priority.cmp(&b.priority),
            OrderField::LastName => a
                .last_name
                .to_lowercase()
                .cmp(&b.last_name.to_lowercase()),
            OrderField::NextFollowUp => a.next_follow_up.cmp(&b.next_follow_up),
        };
        if order.descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn register_identity(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.inner.lock().await;
        // Provisioning hook: exactly one profile per identity. A pre-existing
        // profile fails the whole registration.
        if inner.profiles.contains_key(&user_id) {
            return Err(StoreError::Conflict(format!(
                "profile already exists for {user_id}"
            )));
        }
        let now = Utc::now();
        let profile = Profile {
            user_id,
            display_name: display_name
                .map(str::to_string)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            role: Role::Agent,
            created_at: now,
            updated_at: now,
        };
        inner.profiles.insert(user_id, profile.clone());
        Ok(profile)
    }

    async fn remove_identity(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.profiles.remove(&user_id);
        // Set-null semantics: leads and activities outlive their identities.
        for lead in inner.leads.values_mut() {
            if lead.created_by == Some(user_id) {
                lead.created_by = None;
            }
            if lead.assigned_to == Some(user_id) {
                lead.assigned_to = None;
            }
        }
        for activity in &mut inner.activities {
            if activity.user_id == Some(user_id) {
                activity.user_id = None;
            }
        }
        Ok(())
    }

    async fn list_profiles(&self, _caller: Uuid) -> Result<Vec<Profile>, StoreError> {
        // Profile read is open to any authenticated caller.
        let inner = self.inner.lock().await;
        let mut profiles: Vec<Profile> = inner.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(profiles)
    }

    async fn get_profile(&self, _caller: Uuid, user_id: Uuid) -> Result<Profile, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_profile(
        &self,
        caller: Uuid,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        write_denied(can_update_profile(&caller, user_id))?;
        if display_name.trim().is_empty() {
            return Err(StoreError::Validation(
                "display_name must not be empty".into(),
            ));
        }
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;
        profile.display_name = display_name.to_string();
        // before_update hook.
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn set_role(
        &self,
        caller: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Profile, StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        write_denied(can_change_role(&caller))?;
        let profile = inner
            .profiles
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound)?;
        profile.role = role;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn list_leads(
        &self,
        caller: Uuid,
        filter: &LeadFilter,
        order: LeadOrder,
        page: Page,
    ) -> Result<Vec<Lead>, StoreError> {
        let inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        write_denied(can_read_leads(&caller))?;
        let mut leads: Vec<Lead> = inner
            .leads
            .values()
            .filter(|lead| matches_filter(lead, filter))
            .cloned()
            .collect();
        sort_leads(&mut leads, order);
        Ok(leads
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn get_lead(&self, caller: Uuid, id: Uuid) -> Result<Lead, StoreError> {
        let inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        read_denied(can_read_leads(&caller))?;
        inner.leads.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn insert_lead(&self, caller: Uuid, draft: NewLead) -> Result<Lead, StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        write_denied(can_insert_lead(&caller))?;
        draft.validate()?;
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            created_by: Some(caller.user_id),
            assigned_to: draft.assigned_to,
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone: draft.phone,
            budget_min: draft.budget_min,
            budget_max: draft.budget_max,
            preferred_areas: draft.preferred_areas,
            property_type: draft.property_type,
            bedrooms: draft.bedrooms,
            bathrooms: draft.bathrooms,
            status: draft.status,
            source: draft.source,
            priority: draft.priority,
            notes: draft.notes,
            last_contacted_at: None,
            next_follow_up: draft.next_follow_up,
            created_at: now,
            updated_at: now,
        };
        inner.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn update_lead(
        &self,
        caller: Uuid,
        id: Uuid,
        patch: LeadPatch,
    ) -> Result<Lead, StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        let lead = inner.leads.get(&id).ok_or(StoreError::NotFound)?;
        write_denied(can_update_lead(&caller, lead))?;
        patch.validate()?;
        let lead = inner.leads.get_mut(&id).ok_or(StoreError::NotFound)?;
        patch.apply(lead);
        // before_update hook: fires regardless of which fields changed.
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn delete_lead(&self, caller: Uuid, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        if !inner.leads.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        write_denied(can_delete_lead(&caller))?;
        inner.leads.remove(&id);
        // Activities cascade with their parent lead.
        inner.activities.retain(|a| a.lead_id != id);
        Ok(())
    }

    async fn insert_activity(
        &self,
        caller: Uuid,
        draft: NewActivity,
    ) -> Result<LeadActivity, StoreError> {
        let mut inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        let lead = inner
            .leads
            .get(&draft.lead_id)
            .ok_or(StoreError::NotFound)?;
        write_denied(can_insert_activity(&caller, lead))?;
        draft.validate()?;
        let activity = LeadActivity {
            id: Uuid::new_v4(),
            lead_id: draft.lead_id,
            user_id: Some(caller.user_id),
            activity_type: draft.activity_type,
            description: draft.description,
            metadata: draft.metadata,
            created_at: Utc::now(),
        };
        inner.activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_activities(
        &self,
        caller: Uuid,
        lead_id: Uuid,
    ) -> Result<Vec<LeadActivity>, StoreError> {
        let inner = self.inner.lock().await;
        let caller = inner.caller(caller);
        read_denied(can_read_activities(&caller))?;
        if !inner.leads.contains_key(&lead_id) {
            return Err(StoreError::NotFound);
        }
        Ok(inner
            .activities
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .cloned()
            .collect())
    }
}
