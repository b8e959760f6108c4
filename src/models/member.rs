use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

/// A durable (user, lab) membership. Never deleted: "removal" re-points
/// `lab_role_id` at the Former Member sentinel, "reactivation" points it
/// back at a real role on the same row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LabMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lab_id: Uuid,
    pub lab_role_id: Uuid,
    pub induction_done: bool,
    pub is_pci: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for LabMember {
    fn entity_type() -> &'static str { "member" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLabMember {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lab_id: Uuid,
    pub lab_role_id: Uuid,
    pub induction_done: bool,
    pub is_pci: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbLabMember> for LabMember {
    type Error = AppError;

    fn try_from(value: DbLabMember) -> Result<Self, Self::Error> {
        Ok(LabMember {
            id: value.id,
            user_id: value.user_id,
            lab_id: value.lab_id,
            lab_role_id: value.lab_role_id,
            induction_done: value.induction_done,
            is_pci: value.is_pci,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Member listing row with the joined user and role display fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct LabMemberDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lab_id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role_name: String,
    pub permission_level: i64,
    pub induction_done: bool,
    pub is_pci: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct MemberStatus {
    pub id: Uuid,
    pub member_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeRoleRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPciRequest {
    pub value: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    #[schema(example = "In Lab")]
    pub name: String,
}

/// A user who could be added to a lab: either never a member, or a former
/// member whose row can be reactivated. The flag lets the caller tell the
/// two apart even though both paths end in the same materialize operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailableUser {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub is_former_member: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailableUsersResponse {
    pub users: Vec<AvailableUser>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct AvailableUsersQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
}
