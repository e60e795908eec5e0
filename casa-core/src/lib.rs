//! The service layer: wires the store, the CSV pipelines, activity logging
//! on significant lead mutations, and the dashboard/analytics aggregates.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use casa_csv::{export_leads, import_leads, CsvError, ImportReport};
use casa_schema::{Lead, LeadPatch, NewActivity, NewLead};
use casa_store::{LeadFilter, LeadOrder, LeadStore, Page, StoreError};
use casa_types::{LeadSource, LeadStatus};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_leads: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Leads assigned to the calling identity.
    pub my_leads: usize,
    /// Leads whose next follow-up is due now or overdue.
    pub follow_ups_due: usize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Analytics {
    pub by_status: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<i32, usize>,
}

/// High-level API over the policy-checked store.
pub struct CasaService {
    store: Arc<dyn LeadStore>,
}

impl CasaService {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    /// Insert a lead and append its `created` activity entry.
    pub async fn create_lead(&self, caller: Uuid, draft: NewLead) -> Result<Lead, StoreError> {
        let lead = self.store.insert_lead(caller, draft).await?;
        self.store
            .insert_activity(
                caller,
                NewActivity {
                    lead_id: lead.id,
                    activity_type: "created".into(),
                    description: format!("Lead {} {} created", lead.first_name, lead.last_name),
                    metadata: Default::default(),
                },
            )
            .await?;
        Ok(lead)
    }

    /// Apply a patch and append activity entries for status and assignment
    /// changes.
    pub async fn update_lead(
        &self,
        caller: Uuid,
        id: Uuid,
        patch: LeadPatch,
    ) -> Result<Lead, StoreError> {
        let before = self.store.get_lead(caller, id).await?;
        let after = self.store.update_lead(caller, id, patch).await?;

        if after.status != before.status {
            self.store
                .insert_activity(
                    caller,
                    NewActivity {
                        lead_id: id,
                        activity_type: "status_changed".into(),
                        description: format!(
                            "Status changed from {} to {}",
                            before.status, after.status
                        ),
                        metadata: json!({
                            "from": before.status,
                            "to": after.status,
                        })
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                    },
                )
                .await?;
        }
        if after.assigned_to != before.assigned_to {
            self.store
                .insert_activity(
                    caller,
                    NewActivity {
                        lead_id: id,
                        activity_type: "assigned".into(),
                        description: match after.assigned_to {
                            Some(user) => format!("Lead assigned to {user}"),
                            None => "Lead unassigned".to_string(),
                        },
                        metadata: json!({
                            "from": before.assigned_to,
                            "to": after.assigned_to,
                        })
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                    },
                )
                .await?;
        }
        Ok(after)
    }

    pub async fn import_csv(&self, caller: Uuid, text: &str) -> Result<ImportReport, CsvError> {
        import_leads(self.store.as_ref(), caller, text).await
    }

    pub async fn export_csv(&self, caller: Uuid) -> Result<String, CsvError> {
        export_leads(self.store.as_ref(), caller).await
    }

    /// Aggregate counts for the dashboard; visibility follows lead read
    /// policy, so a caller with no role is denied.
    pub async fn dashboard_stats(&self, caller: Uuid) -> Result<DashboardStats, StoreError> {
        let leads = self.all_leads(caller).await?;
        let now = Utc::now();
        let mut stats = DashboardStats {
            total_leads: leads.len(),
            ..Default::default()
        };
        for status in LeadStatus::ALL {
            stats.by_status.insert(status.to_string(), 0);
        }
        for lead in &leads {
            *stats.by_status.entry(lead.status.to_string()).or_default() += 1;
            if lead.assigned_to == Some(caller) {
                stats.my_leads += 1;
            }
            if lead.next_follow_up.is_some_and(|due| due <= now) {
                stats.follow_ups_due += 1;
            }
        }
        Ok(stats)
    }

    /// Breakdowns by status, source, and priority.
    pub async fn analytics(&self, caller: Uuid) -> Result<Analytics, StoreError> {
        let leads = self.all_leads(caller).await?;
        let mut analytics = Analytics::default();
        for status in LeadStatus::ALL {
            analytics.by_status.insert(status.to_string(), 0);
        }
        for source in LeadSource::ALL {
            analytics.by_source.insert(source.to_string(), 0);
        }
        for lead in &leads {
            *analytics
                .by_status
                .entry(lead.status.to_string())
                .or_default() += 1;
            *analytics
                .by_source
                .entry(lead.source.to_string())
                .or_default() += 1;
            *analytics.by_priority.entry(lead.priority).or_default() += 1;
        }
        Ok(analytics)
    }

    async fn all_leads(&self, caller: Uuid) -> Result<Vec<Lead>, StoreError> {
        self.store
            .list_leads(caller, &LeadFilter::default(), LeadOrder::default(), Page::all())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casa_store::InMemoryStore;
    use casa_types::Role;
    use chrono::Duration;

    async fn service() -> (CasaService, Uuid, Uuid) {
        let admin = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let store = Arc::new(InMemoryStore::with_admin(admin, "Admin"));
        store.register_identity(agent, Some("Agent")).await.unwrap();
        (CasaService::new(store), admin, agent)
    }

    #[tokio::test]
    async fn create_appends_created_activity() {
        let (service, _, agent) = service().await;
        let lead = service
            .create_lead(agent, NewLead::new("John", "Doe", "john@x.com"))
            .await
            .unwrap();
        let activities = service
            .store()
            .list_activities(agent, lead.id)
            .await
            .unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, "created");
        assert_eq!(activities[0].user_id, Some(agent));
    }

    #[tokio::test]
    async fn status_and_assignment_changes_are_logged() {
        let (service, admin, agent) = service().await;
        let lead = service
            .create_lead(agent, NewLead::new("Jane", "Smith", "jane@x.com"))
            .await
            .unwrap();

        service
            .update_lead(
                agent,
                lead.id,
                LeadPatch {
                    status: Some(LeadStatus::Contacted),
                    assigned_to: Some(Some(admin)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let activities = service
            .store()
            .list_activities(agent, lead.id)
            .await
            .unwrap();
        let kinds: Vec<&str> = activities.iter().map(|a| a.activity_type.as_str()).collect();
        assert!(kinds.contains(&"created"));
        assert!(kinds.contains(&"status_changed"));
        assert!(kinds.contains(&"assigned"));

        let status_change = activities
            .iter()
            .find(|a| a.activity_type == "status_changed")
            .unwrap();
        assert_eq!(status_change.metadata["from"], json!("new"));
        assert_eq!(status_change.metadata["to"], json!("contacted"));
    }

    #[tokio::test]
    async fn no_activity_for_untracked_field_changes() {
        let (service, _, agent) = service().await;
        let lead = service
            .create_lead(agent, NewLead::new("Ann", "Lee", "ann@x.com"))
            .await
            .unwrap();
        service
            .update_lead(
                agent,
                lead.id,
                LeadPatch {
                    notes: Some("left voicemail".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let activities = service
            .store()
            .list_activities(agent, lead.id)
            .await
            .unwrap();
        assert_eq!(activities.len(), 1); // just "created"
    }

    #[tokio::test]
    async fn dashboard_counts_statuses_and_follow_ups() {
        let (service, admin, agent) = service().await;
        let mut due = NewLead::new("Due", "Now", "due@x.com");
        due.next_follow_up = Some(Utc::now() - Duration::hours(1));
        due.assigned_to = Some(agent);
        service.create_lead(agent, due).await.unwrap();

        let mut later = NewLead::new("Later", "On", "later@x.com");
        later.next_follow_up = Some(Utc::now() + Duration::days(2));
        later.status = LeadStatus::Contacted;
        service.create_lead(admin, later).await.unwrap();

        let stats = service.dashboard_stats(agent).await.unwrap();
        assert_eq!(stats.total_leads, 2);
        assert_eq!(stats.by_status["new"], 1);
        assert_eq!(stats.by_status["contacted"], 1);
        assert_eq!(stats.by_status["closed"], 0);
        assert_eq!(stats.my_leads, 1);
        assert_eq!(stats.follow_ups_due, 1);
    }

    #[tokio::test]
    async fn analytics_breakdowns_are_policy_scoped() {
        let (service, admin, agent) = service().await;
        let mut draft = NewLead::new("A", "One", "a@x.com");
        draft.source = LeadSource::Referral;
        draft.priority = 5;
        service.create_lead(agent, draft).await.unwrap();

        let analytics = service.analytics(agent).await.unwrap();
        assert_eq!(analytics.by_source["referral"], 1);
        assert_eq!(analytics.by_source["website"], 0);
        assert_eq!(analytics.by_priority[&5], 1);

        // A viewer still sees aggregates; a caller with no role does not.
        let viewer = Uuid::new_v4();
        service
            .store()
            .register_identity(viewer, Some("Viewer"))
            .await
            .unwrap();
        service
            .store()
            .set_role(admin, viewer, Role::Viewer)
            .await
            .unwrap();
        assert!(service.analytics(viewer).await.is_ok());

        let stranger = Uuid::new_v4();
        assert!(matches!(
            service.dashboard_stats(stranger).await,
            Err(StoreError::AccessDenied(_))
        ));
    }
}
