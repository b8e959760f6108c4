//! Admission workflow: PENDING -> APPROVED | REJECTED | WITHDRAWN.
//!
//! Terminal rows are never deleted; they are the audit trail. A partial
//! unique index keeps at most one PENDING row per (user, lab), and every
//! transition is an optimistic `WHERE status = 'PENDING'` update so a
//! terminal admission can never be acted on twice.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::authz::{self, LabAction};
use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::membership;
use crate::models::admission::{AdmissionDetail, AdmissionStatus, DbLabAdmission};
use crate::models::lab::LabSummary;
use crate::models::member::DbLabMember;
use crate::models::role::LabRole;
use crate::models::user::UserSummary;
use crate::utils::utc_now;

const ADMISSION_COLUMNS: &str =
    "id, lab_id, user_id, role_id, status, is_pci, decided_by, created_at, updated_at";

/// File a request to join a lab. The requested role must be a real
/// (non-sentinel) lab role and the user must not already be an active
/// member. The pending-uniqueness index makes the duplicate-request race
/// lose with a conflict instead of a second row.
pub async fn request(
    pool: &SqlitePool,
    sentinel_role_id: Uuid,
    lab_id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
) -> AppResult<DbLabAdmission> {
    membership::fetch_lab(pool, lab_id).await?;
    ensure_user_exists(pool, user_id).await?;

    let role = membership::fetch_lab_role(pool, role_id).await?;
    if role.id == sentinel_role_id {
        return Err(AppError::bad_request("the former-member role cannot be requested"));
    }

    if membership::is_active_member(pool, user_id, lab_id).await? {
        return Err(AppError::conflict("user is already a member of this lab"));
    }

    let admission_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO lab_admissions (id, lab_id, user_id, role_id, status, created_at, updated_at) VALUES (?, ?, ?, ?, 'PENDING', ?, ?)",
    )
    .bind(admission_id)
    .bind(lab_id)
    .bind(user_id)
    .bind(role_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|err| conflict_on_unique(err, "an admission request is already pending for this lab"))?;

    fetch_admission(pool, admission_id).await
}

/// Approve a pending admission and materialize the membership in the same
/// transaction. If materialize fails, the status flip rolls back with it.
pub async fn approve(
    pool: &SqlitePool,
    sentinel_role_id: Uuid,
    admission_id: Uuid,
    actor_user_id: Uuid,
    role_override: Option<Uuid>,
    is_pci: Option<bool>,
) -> AppResult<(DbLabAdmission, DbLabMember)> {
    let admission = fetch_admission(pool, admission_id).await?;

    let actor = authz::resolve_actor(pool, actor_user_id, admission.lab_id).await?;
    authz::authorize(&actor, LabAction::ApproveAdmission)?;

    let role_id = role_override.unwrap_or(admission.role_id);
    let role = membership::fetch_lab_role(pool, role_id).await?;
    if role.id == sentinel_role_id {
        return Err(AppError::bad_request("the former-member role cannot be granted"));
    }
    let is_pci = is_pci.unwrap_or(false);

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE lab_admissions SET status = 'APPROVED', role_id = ?, is_pci = ?, decided_by = ?, updated_at = ? WHERE id = ? AND status = 'PENDING'",
    )
    .bind(role_id)
    .bind(is_pci)
    .bind(actor_user_id)
    .bind(utc_now())
    .bind(admission_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::invalid_state("admission is not pending"));
    }

    let member = membership::materialize(
        &mut *tx,
        sentinel_role_id,
        admission.user_id,
        admission.lab_id,
        role_id,
        is_pci,
    )
    .await?;

    tx.commit().await?;

    let admission = fetch_admission(pool, admission_id).await?;
    Ok((admission, member))
}

/// Reject a pending admission. No membership side effect.
pub async fn reject(
    pool: &SqlitePool,
    admission_id: Uuid,
    actor_user_id: Uuid,
) -> AppResult<DbLabAdmission> {
    let admission = fetch_admission(pool, admission_id).await?;

    let actor = authz::resolve_actor(pool, actor_user_id, admission.lab_id).await?;
    authz::authorize(&actor, LabAction::RejectAdmission)?;

    transition(pool, admission_id, AdmissionStatus::Rejected, Some(actor_user_id)).await
}

/// Withdraw one's own pending admission. Strictly first-person: even a root
/// admin cannot withdraw on someone else's behalf.
pub async fn withdraw(
    pool: &SqlitePool,
    admission_id: Uuid,
    requesting_user_id: Uuid,
) -> AppResult<DbLabAdmission> {
    let admission = fetch_admission(pool, admission_id).await?;

    if admission.user_id != requesting_user_id {
        return Err(AppError::forbidden("only the requester may withdraw an admission"));
    }

    transition(pool, admission_id, AdmissionStatus::Withdrawn, None).await
}

async fn transition(
    pool: &SqlitePool,
    admission_id: Uuid,
    to: AdmissionStatus,
    decided_by: Option<Uuid>,
) -> AppResult<DbLabAdmission> {
    let updated = sqlx::query(
        "UPDATE lab_admissions SET status = ?, decided_by = ?, updated_at = ? WHERE id = ? AND status = 'PENDING'",
    )
    .bind(to.as_str())
    .bind(decided_by)
    .bind(utc_now())
    .bind(admission_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::invalid_state("admission is not pending"));
    }

    fetch_admission(pool, admission_id).await
}

/// Admissions for a lab, newest first, with embedded summaries. Manager-only.
pub async fn list_for_lab(
    pool: &SqlitePool,
    lab_id: Uuid,
    actor_user_id: Uuid,
) -> AppResult<Vec<AdmissionDetail>> {
    let actor = authz::resolve_actor(pool, actor_user_id, lab_id).await?;
    authz::authorize(&actor, LabAction::ListAdmissions)?;

    membership::fetch_lab(pool, lab_id).await?;

    let rows = sqlx::query_as::<_, AdmissionDetailRow>(
        &detail_sql("a.lab_id = ?"),
    )
    .bind(lab_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AdmissionDetail::try_from).collect()
}

/// The caller's own admission history across labs, newest first.
pub async fn list_mine(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<AdmissionDetail>> {
    let rows = sqlx::query_as::<_, AdmissionDetailRow>(
        &detail_sql("a.user_id = ?"),
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AdmissionDetail::try_from).collect()
}

fn detail_sql(filter: &str) -> String {
    format!(
        "SELECT a.id, a.lab_id, a.user_id, a.role_id, a.status, a.is_pci, a.decided_by, a.created_at, a.updated_at, \
           u.display_name, u.email, l.name AS lab_name, lr.name AS role_name, lr.permission_level \
         FROM lab_admissions a \
         INNER JOIN users u ON u.id = a.user_id \
         INNER JOIN labs l ON l.id = a.lab_id \
         INNER JOIN lab_roles lr ON lr.id = a.role_id \
         WHERE {filter} \
         ORDER BY a.created_at DESC",
    )
}

#[derive(sqlx::FromRow)]
struct AdmissionDetailRow {
    id: Uuid,
    lab_id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
    status: String,
    is_pci: Option<bool>,
    decided_by: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    display_name: String,
    email: String,
    lab_name: String,
    role_name: String,
    permission_level: i64,
}

impl TryFrom<AdmissionDetailRow> for AdmissionDetail {
    type Error = AppError;

    fn try_from(row: AdmissionDetailRow) -> Result<Self, Self::Error> {
        let admission = DbLabAdmission {
            id: row.id,
            lab_id: row.lab_id,
            user_id: row.user_id,
            role_id: row.role_id,
            status: row.status,
            is_pci: row.is_pci,
            decided_by: row.decided_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
        .try_into()?;

        Ok(AdmissionDetail {
            admission,
            user: UserSummary {
                id: row.user_id,
                display_name: row.display_name,
                email: row.email,
            },
            lab: LabSummary {
                id: row.lab_id,
                name: row.lab_name,
            },
            role: LabRole {
                id: row.role_id,
                name: row.role_name,
                permission_level: row.permission_level,
            },
        })
    }
}

pub async fn fetch_admission(pool: &SqlitePool, admission_id: Uuid) -> AppResult<DbLabAdmission> {
    let sql = format!("SELECT {ADMISSION_COLUMNS} FROM lab_admissions WHERE id = ?");
    sqlx::query_as::<_, DbLabAdmission>(&sql)
        .bind(admission_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("admission not found"))
}

async fn ensure_user_exists(pool: &SqlitePool, user_id: Uuid) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found("user not found"));
    }

    Ok(())
}
