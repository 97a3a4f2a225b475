use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Patient,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::Suspended => write!(f, "suspended"),
        }
    }
}

/// Provider-side profile data carried by the directory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub approval_status: ApprovalStatus,
    pub consultation_fee: f64,
}

/// Identity record for either side of a booking, as supplied by the
/// directory. Patients carry no provider profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRecord {
    pub id: Uuid,
    pub role: PartyRole,
    pub timezone: String,
    pub has_completed_profile: bool,
    pub provider_profile: Option<ProviderProfile>,
}

impl PartyRecord {
    pub fn is_bookable_provider(&self) -> bool {
        matches!(
            &self.provider_profile,
            Some(profile) if profile.approval_status == ApprovalStatus::Approved
        )
    }
}
