use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a string does not match any literal of a fixed enumeration.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} value: {value}")]
pub struct InvalidLiteral {
    pub kind: &'static str,
    pub value: String,
}

/// Coarse-grained permission level assigned per identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Agent,
    Viewer,
}

impl Role {
    /// Storage literal, exactly as persisted.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = InvalidLiteral;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "agent" => Ok(Role::Agent),
            "viewer" => Ok(Role::Viewer),
            other => Err(InvalidLiteral {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Funnel position of a lead.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    NotQualified,
    Closed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::NotQualified,
        LeadStatus::Closed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::NotQualified => "not_qualified",
            LeadStatus::Closed => "closed",
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = InvalidLiteral;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "not_qualified" => Ok(LeadStatus::NotQualified),
            "closed" => Ok(LeadStatus::Closed),
            other => Err(InvalidLiteral {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the lead came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    SocialMedia,
    ColdCall,
    EmailCampaign,
    Other,
}

impl LeadSource {
    pub const ALL: [LeadSource; 6] = [
        LeadSource::Website,
        LeadSource::Referral,
        LeadSource::SocialMedia,
        LeadSource::ColdCall,
        LeadSource::EmailCampaign,
        LeadSource::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::SocialMedia => "social_media",
            LeadSource::ColdCall => "cold_call",
            LeadSource::EmailCampaign => "email_campaign",
            LeadSource::Other => "other",
        }
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        LeadSource::Website
    }
}

impl fmt::Display for LeadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadSource {
    type Err = InvalidLiteral;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website" => Ok(LeadSource::Website),
            "referral" => Ok(LeadSource::Referral),
            "social_media" => Ok(LeadSource::SocialMedia),
            "cold_call" => Ok(LeadSource::ColdCall),
            "email_campaign" => Ok(LeadSource::EmailCampaign),
            "other" => Ok(LeadSource::Other),
            other => Err(InvalidLiteral {
                kind: "source",
                value: other.to_string(),
            }),
        }
    }
}

/// Priority bounds for a lead, inclusive.
pub const PRIORITY_MIN: i32 = 1;
pub const PRIORITY_MAX: i32 = 5;
pub const PRIORITY_DEFAULT: i32 = 3;
