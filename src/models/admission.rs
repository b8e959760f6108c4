use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::models::lab::LabSummary;
use crate::models::member::LabMember;
use crate::models::role::LabRole;
use crate::models::user::UserSummary;

/// Admission workflow states. `Pending` is the only non-terminal state; no
/// transition is defined out of the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdmissionStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl AdmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionStatus::Pending => "PENDING",
            AdmissionStatus::Approved => "APPROVED",
            AdmissionStatus::Rejected => "REJECTED",
            AdmissionStatus::Withdrawn => "WITHDRAWN",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "PENDING" => Ok(AdmissionStatus::Pending),
            "APPROVED" => Ok(AdmissionStatus::Approved),
            "REJECTED" => Ok(AdmissionStatus::Rejected),
            "WITHDRAWN" => Ok(AdmissionStatus::Withdrawn),
            other => Err(AppError::internal(format!("unknown admission status: {other}"))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AdmissionStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LabAdmission {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub status: AdmissionStatus,
    pub is_pci: Option<bool>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for LabAdmission {
    fn entity_type() -> &'static str { "admission" }
    fn subject_id(&self) -> Uuid { self.user_id }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLabAdmission {
    pub id: Uuid,
    pub lab_id: Uuid,
    pub user_id: Uuid,
    pub role_id: Uuid,
    pub status: String,
    pub is_pci: Option<bool>,
    pub decided_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbLabAdmission {
    pub fn status(&self) -> Result<AdmissionStatus, AppError> {
        AdmissionStatus::parse(&self.status)
    }
}

impl TryFrom<DbLabAdmission> for LabAdmission {
    type Error = AppError;

    fn try_from(value: DbLabAdmission) -> Result<Self, Self::Error> {
        let status = AdmissionStatus::parse(&value.status)?;
        Ok(LabAdmission {
            id: value.id,
            lab_id: value.lab_id,
            user_id: value.user_id,
            role_id: value.role_id,
            status,
            is_pci: value.is_pci,
            decided_by: value.decided_by,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Admission listing row with embedded user/lab/role summaries, returned
/// newest-first so the live request for a pair surfaces before stale
/// terminal ones.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AdmissionDetail {
    #[serde(flatten)]
    pub admission: LabAdmission,
    pub user: UserSummary,
    pub lab: LabSummary,
    pub role: LabRole,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RequestAdmissionRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveAdmissionRequest {
    /// Role granted on approval; defaults to the requested role.
    pub role_id: Option<Uuid>,
    /// PCI responsibility flag, decided at approval time.
    pub is_pci: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApprovalResponse {
    pub admission: LabAdmission,
    pub member: LabMember,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [
            AdmissionStatus::Pending,
            AdmissionStatus::Approved,
            AdmissionStatus::Rejected,
            AdmissionStatus::Withdrawn,
        ] {
            assert_eq!(AdmissionStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!AdmissionStatus::Pending.is_terminal());
        assert!(AdmissionStatus::Approved.is_terminal());
        assert!(AdmissionStatus::Rejected.is_terminal());
        assert!(AdmissionStatus::Withdrawn.is_terminal());
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert!(AdmissionStatus::parse("CANCELLED").is_err());
    }
}
