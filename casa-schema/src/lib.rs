//! Entity records, drafts/patches, and schema-level constraint checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use casa_types::{LeadSource, LeadStatus, Role, PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}, got {0}")]
    PriorityOutOfRange(i32),
}

/// One per identity; created by the provisioning hook, never deleted by the app.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A prospective buyer tracked through the sales funnel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    /// Cleared (not cascaded) when the creator identity is removed.
    pub created_by: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub budget_min: Option<f64>,
    pub budget_max: Option<f64>,
    pub preferred_areas: Vec<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<u32>,
    /// Half-steps supported (2.5 baths).
    pub bathrooms: Option<f64>,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub priority: i32,
    pub notes: Option<String>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub next_follow_up: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit entry tied to one lead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeadActivity {
    pub id: Uuid,
    pub lead_id: Uuid,
    /// Cleared when the acting identity is removed.
    pub user_id: Option<Uuid>,
    pub activity_type: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// Draft for inserting a lead. Defaults: status=new, source=website, priority=3.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewLead {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub preferred_areas: Vec<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub next_follow_up: Option<DateTime<Utc>>,
}

fn default_priority() -> i32 {
    PRIORITY_DEFAULT
}

impl NewLead {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone: None,
            assigned_to: None,
            budget_min: None,
            budget_max: None,
            preferred_areas: Vec::new(),
            property_type: None,
            bedrooms: None,
            bathrooms: None,
            status: LeadStatus::default(),
            source: LeadSource::default(),
            priority: PRIORITY_DEFAULT,
            notes: None,
            next_follow_up: None,
        }
    }

    /// Schema-level constraint check; runs before any insert.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.first_name.trim().is_empty() {
            return Err(SchemaError::MissingField("first_name"));
        }
        if self.last_name.trim().is_empty() {
            return Err(SchemaError::MissingField("last_name"));
        }
        if self.email.trim().is_empty() {
            return Err(SchemaError::MissingField("email"));
        }
        validate_priority(self.priority)
    }
}

/// Partial update for a lead. `None` means "leave unchanged"; `assigned_to`
/// is double-optioned so the assignee can be explicitly cleared.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LeadPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<Uuid>>,
    #[serde(default)]
    pub budget_min: Option<f64>,
    #[serde(default)]
    pub budget_max: Option<f64>,
    #[serde(default)]
    pub preferred_areas: Option<Vec<String>>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_follow_up: Option<DateTime<Utc>>,
}

// `Option<Option<T>>` deserializer: absent = unchanged, null = clear.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn deserialize<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }

    pub fn serialize<T, S>(value: &Option<Option<T>>, ser: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(ser),
            None => ser.serialize_none(),
        }
    }
}

impl LeadPatch {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if let Some(first) = &self.first_name {
            if first.trim().is_empty() {
                return Err(SchemaError::MissingField("first_name"));
            }
        }
        if let Some(last) = &self.last_name {
            if last.trim().is_empty() {
                return Err(SchemaError::MissingField("last_name"));
            }
        }
        if let Some(email) = &self.email {
            if email.trim().is_empty() {
                return Err(SchemaError::MissingField("email"));
            }
        }
        if let Some(priority) = self.priority {
            validate_priority(priority)?;
        }
        Ok(())
    }

    /// Apply the patch in place. Does not touch timestamps; the store's
    /// `before_update` hook owns `updated_at`.
    pub fn apply(&self, lead: &mut Lead) {
        if let Some(v) = &self.first_name {
            lead.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            lead.last_name = v.clone();
        }
        if let Some(v) = &self.email {
            lead.email = v.clone();
        }
        if let Some(v) = &self.phone {
            lead.phone = Some(v.clone());
        }
        if let Some(v) = self.assigned_to {
            lead.assigned_to = v;
        }
        if let Some(v) = self.budget_min {
            lead.budget_min = Some(v);
        }
        if let Some(v) = self.budget_max {
            lead.budget_max = Some(v);
        }
        if let Some(v) = &self.preferred_areas {
            lead.preferred_areas = v.clone();
        }
        if let Some(v) = &self.property_type {
            lead.property_type = Some(v.clone());
        }
        if let Some(v) = self.bedrooms {
            lead.bedrooms = Some(v);
        }
        if let Some(v) = self.bathrooms {
            lead.bathrooms = Some(v);
        }
        if let Some(v) = self.status {
            lead.status = v;
        }
        if let Some(v) = self.source {
            lead.source = v;
        }
        if let Some(v) = self.priority {
            lead.priority = v;
        }
        if let Some(v) = &self.notes {
            lead.notes = Some(v.clone());
        }
        if let Some(v) = self.last_contacted_at {
            lead.last_contacted_at = Some(v);
        }
        if let Some(v) = self.next_follow_up {
            lead.next_follow_up = Some(v);
        }
    }
}

/// Draft for appending an activity entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewActivity {
    pub lead_id: Uuid,
    pub activity_type: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl NewActivity {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.description.trim().is_empty() {
            return Err(SchemaError::MissingField("description"));
        }
        Ok(())
    }
}

pub fn validate_priority(priority: i32) -> Result<(), SchemaError> {
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        return Err(SchemaError::PriorityOutOfRange(priority));
    }
    Ok(())
}

/// Fixed export column order for the CSV pipelines.
pub const EXPORT_COLUMNS: [&str; 15] = [
    "first_name",
    "last_name",
    "email",
    "phone",
    "budget_min",
    "budget_max",
    "preferred_areas",
    "property_type",
    "bedrooms",
    "bathrooms",
    "status",
    "source",
    "priority",
    "notes",
    "created_at",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lead_requires_names_and_email() {
        let mut draft = NewLead::new("", "Doe", "john@example.com");
        assert_eq!(draft.validate(), Err(SchemaError::MissingField("first_name")));
        draft.first_name = "John".into();
        draft.email = "  ".into();
        assert_eq!(draft.validate(), Err(SchemaError::MissingField("email")));
        draft.email = "john@example.com".into();
        assert_eq!(draft.validate(), Ok(()));
    }

    #[test]
    fn priority_bounds_enforced() {
        let mut draft = NewLead::new("John", "Doe", "john@example.com");
        draft.priority = 0;
        assert_eq!(draft.validate(), Err(SchemaError::PriorityOutOfRange(0)));
        draft.priority = 6;
        assert!(draft.validate().is_err());
        for p in 1..=5 {
            draft.priority = p;
            assert_eq!(draft.validate(), Ok(()));
        }
    }

    #[test]
    fn patch_priority_checked_only_when_present() {
        let patch = LeadPatch::default();
        assert_eq!(patch.validate(), Ok(()));
        let patch = LeadPatch {
            priority: Some(9),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Err(SchemaError::PriorityOutOfRange(9)));
    }

    #[test]
    fn patch_clears_assignee_with_explicit_null() {
        let patch: LeadPatch = serde_json::from_str(r#"{"assigned_to": null}"#).unwrap();
        assert_eq!(patch.assigned_to, Some(None));
        let patch: LeadPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(patch.assigned_to, None);
    }
}
