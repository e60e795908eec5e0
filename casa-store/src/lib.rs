//! The data-access interface: every method is policy-checked before it
//! touches data, so callers never bypass row-level authorization.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use casa_schema::{
    Lead, LeadActivity, LeadPatch, NewActivity, NewLead, Profile, SchemaError,
};
use casa_types::{LeadSource, LeadStatus, Role};

pub mod mem;
pub use mem::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing row — also covers denied reads, which are indistinguishable
    /// from absence by convention.
    #[error("not found")]
    NotFound,
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<SchemaError> for StoreError {
    fn from(err: SchemaError) -> Self {
        StoreError::Validation(err.to_string())
    }
}

/// Equality filters plus a case-insensitive substring search over
/// first name, last name, and email.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeadFilter {
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderField {
    CreatedAt,
    UpdatedAt,
    Priority,
    LastName,
    NextFollowUp,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LeadOrder {
    pub field: OrderField,
    pub descending: bool,
}

impl Default for LeadOrder {
    fn default() -> Self {
        // Newest first, matching the list screens.
        Self {
            field: OrderField::CreatedAt,
            descending: true,
        }
    }
}

/// Offset/limit pagination window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

impl Page {
    /// The whole visible set, for export and aggregates.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

/// Storage collaborator consumed by the pipelines and services. The caller
/// id on every method is the identity claim; role resolution and the policy
/// table run inside the implementation.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Provisioning hook entry: atomically creates the identity's profile
    /// (role `agent`). Fails with `Conflict` if a profile already exists,
    /// which fails the whole registration.
    async fn register_identity(
        &self,
        user_id: Uuid,
        display_name: Option<&str>,
    ) -> Result<Profile, StoreError>;

    /// Identity deletion: cascades the profile, clears creator/assignee
    /// references on leads and actor references on activities.
    async fn remove_identity(&self, user_id: Uuid) -> Result<(), StoreError>;

    async fn list_profiles(&self, caller: Uuid) -> Result<Vec<Profile>, StoreError>;
    async fn get_profile(&self, caller: Uuid, user_id: Uuid) -> Result<Profile, StoreError>;
    async fn update_profile(
        &self,
        caller: Uuid,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<Profile, StoreError>;
    /// Admin-only role assignment.
    async fn set_role(&self, caller: Uuid, user_id: Uuid, role: Role)
        -> Result<Profile, StoreError>;

    async fn list_leads(
        &self,
        caller: Uuid,
        filter: &LeadFilter,
        order: LeadOrder,
        page: Page,
    ) -> Result<Vec<Lead>, StoreError>;
    async fn get_lead(&self, caller: Uuid, id: Uuid) -> Result<Lead, StoreError>;
    async fn insert_lead(&self, caller: Uuid, draft: NewLead) -> Result<Lead, StoreError>;
    async fn update_lead(
        &self,
        caller: Uuid,
        id: Uuid,
        patch: LeadPatch,
    ) -> Result<Lead, StoreError>;
    async fn delete_lead(&self, caller: Uuid, id: Uuid) -> Result<(), StoreError>;

    /// Append-only: there is no update or delete for activities.
    async fn insert_activity(
        &self,
        caller: Uuid,
        draft: NewActivity,
    ) -> Result<LeadActivity, StoreError>;
    async fn list_activities(
        &self,
        caller: Uuid,
        lead_id: Uuid,
    ) -> Result<Vec<LeadActivity>, StoreError>;
}
