use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Site-wide permission ceiling: a user whose `Role` sits here may act on
/// any lab unconditionally.
pub const ROOT_ADMIN_PERMISSION: i64 = 100;

/// Lab-scoped management tier: a `LabRole` at or above this level may run
/// admission and membership administration for its lab.
pub const LAB_MANAGER_PERMISSION: i64 = 70;

/// Reserved permission level of the single "Former Member" sentinel role.
/// A membership pointing at the sentinel is inactive; everything `>= 0` is
/// active. The sentinel row is resolved once at startup and must never be a
/// selectable target for admissions or role changes.
pub const FORMER_MEMBER_PERMISSION: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permission_level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct LabRole {
    pub id: Uuid,
    pub name: String,
    pub permission_level: i64,
}

impl LabRole {
    pub fn is_sentinel(&self) -> bool {
        self.permission_level == FORMER_MEMBER_PERMISSION
    }
}

#[derive(Debug, Deserialize)]
pub struct LabRoleListQuery {
    /// When true, the Former Member sentinel is excluded so the result can
    /// feed role pickers directly.
    #[serde(default)]
    pub selectable: bool,
}
