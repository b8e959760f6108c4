//! Authorization gate for lab-scoped administrative actions.
//!
//! Every mutating membership/admission operation funnels through [`authorize`]
//! so the permission thresholds live in one policy table instead of inline
//! integer comparisons scattered across handlers. Self-service paths
//! (withdrawing one's own admission, setting one's own status) use an
//! identity check instead of this gate.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::role::{LAB_MANAGER_PERMISSION, ROOT_ADMIN_PERMISSION};

/// Lab-management actions covered by the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabAction {
    ApproveAdmission,
    RejectAdmission,
    ListAdmissions,
    RemoveMember,
    ChangeRole,
    SetInduction,
    SetPci,
    SetMemberStatus,
    ListAvailableUsers,
}

impl LabAction {
    /// Minimum lab-role permission tier required for the action. Currently a
    /// flat manager tier; kept as a table so individual actions can diverge
    /// without touching call sites.
    pub fn required_tier(&self) -> i64 {
        match self {
            LabAction::ApproveAdmission
            | LabAction::RejectAdmission
            | LabAction::ListAdmissions
            | LabAction::RemoveMember
            | LabAction::ChangeRole
            | LabAction::SetInduction
            | LabAction::SetPci
            | LabAction::SetMemberStatus
            | LabAction::ListAvailableUsers => LAB_MANAGER_PERMISSION,
        }
    }
}

/// The acting principal resolved for one target lab: site-wide permission
/// level plus the permission level of their active membership in that lab,
/// if any. A sentinel-roled (former member) row resolves to `None`.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub site_permission: i64,
    pub lab_permission: Option<i64>,
}

impl Actor {
    pub fn is_root_admin(&self) -> bool {
        self.site_permission >= ROOT_ADMIN_PERMISSION
    }

    pub fn can(&self, action: LabAction) -> bool {
        if self.is_root_admin() {
            return true;
        }
        match self.lab_permission {
            Some(level) => level >= action.required_tier(),
            None => false,
        }
    }
}

pub fn authorize(actor: &Actor, action: LabAction) -> AppResult<()> {
    if actor.can(action) {
        tracing::debug!(
            user_id = %actor.user_id,
            action = ?action,
            "lab action authorized"
        );
        return Ok(());
    }

    tracing::debug!(
        user_id = %actor.user_id,
        action = ?action,
        site_permission = actor.site_permission,
        lab_permission = ?actor.lab_permission,
        "lab action denied"
    );
    Err(AppError::forbidden("not authorized to manage this lab"))
}

/// Resolve the caller's site permission and their active lab permission for
/// the target lab. Only memberships with a non-sentinel role count.
pub async fn resolve_actor(pool: &SqlitePool, user_id: Uuid, lab_id: Uuid) -> AppResult<Actor> {
    let site_permission: i64 = sqlx::query_scalar(
        "SELECT r.permission_level FROM users u INNER JOIN roles r ON r.id = u.role_id WHERE u.id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))?;

    let lab_permission: Option<i64> = sqlx::query_scalar(
        "SELECT lr.permission_level FROM lab_members m \
         INNER JOIN lab_roles lr ON lr.id = m.lab_role_id \
         WHERE m.user_id = ? AND m.lab_id = ? AND lr.permission_level >= 0",
    )
    .bind(user_id)
    .bind(lab_id)
    .fetch_optional(pool)
    .await?;

    Ok(Actor {
        user_id,
        site_permission,
        lab_permission,
    })
}
