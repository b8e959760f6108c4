//! Membership store: the durable (user, lab) record and its mutations.
//!
//! A `lab_members` row is created once per (user, lab) and never deleted.
//! Removal re-points `lab_role_id` at the Former Member sentinel; approval of
//! a later admission re-points it back (reactivation) on the same row, which
//! is why `induction_done` survives a removal/rejoin cycle.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::authz::{self, LabAction};
use crate::errors::{conflict_on_unique, AppError, AppResult};
use crate::models::lab::Lab;
use crate::models::member::{
    AvailableUser, AvailableUsersQuery, DbLabMember, LabMemberDetail, MemberStatus, Pagination,
};
use crate::models::role::LabRole;
use crate::utils::utc_now;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

const MEMBER_COLUMNS: &str =
    "id, user_id, lab_id, lab_role_id, induction_done, is_pci, created_at, updated_at";

/// Create-or-reactivate the membership for (user, lab). Runs on a caller
/// supplied connection so `approve` can keep it inside one transaction.
///
/// First-time join inserts a fresh row with `induction_done = false`;
/// a sentinel-roled row is re-pointed at the given role instead. An already
/// active membership is a conflict: `request` guards it, but the guard is
/// re-checked here against racing writers.
pub async fn materialize(
    conn: &mut SqliteConnection,
    sentinel_role_id: Uuid,
    user_id: Uuid,
    lab_id: Uuid,
    role_id: Uuid,
    is_pci: bool,
) -> AppResult<DbLabMember> {
    let existing = fetch_member_pair(&mut *conn, user_id, lab_id).await?;
    let now = utc_now();

    match existing {
        None => {
            let member_id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO lab_members (id, user_id, lab_id, lab_role_id, induction_done, is_pci, created_at, updated_at) VALUES (?, ?, ?, ?, FALSE, ?, ?, ?)",
            )
            .bind(member_id)
            .bind(user_id)
            .bind(lab_id)
            .bind(role_id)
            .bind(is_pci)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|err| conflict_on_unique(err, "user is already a member of this lab"))?;

            fetch_member(&mut *conn, member_id).await
        }
        Some(member) if member.lab_role_id == sentinel_role_id => {
            // Reactivation: same row, new role. induction_done is deliberately
            // left alone so induction history survives removal.
            sqlx::query(
                "UPDATE lab_members SET lab_role_id = ?, is_pci = ?, updated_at = ? WHERE id = ?",
            )
            .bind(role_id)
            .bind(is_pci)
            .bind(now)
            .bind(member.id)
            .execute(&mut *conn)
            .await?;

            fetch_member(&mut *conn, member.id).await
        }
        Some(_) => Err(AppError::conflict("user is already a member of this lab")),
    }
}

/// Soft-remove an active member by re-pointing their role at the sentinel.
/// Status history and the induction/PCI flags are preserved for audit and a
/// possible reactivation.
pub async fn remove(
    pool: &SqlitePool,
    sentinel_role_id: Uuid,
    lab_id: Uuid,
    user_id: Uuid,
    actor_user_id: Uuid,
) -> AppResult<DbLabMember> {
    let actor = authz::resolve_actor(pool, actor_user_id, lab_id).await?;
    authz::authorize(&actor, LabAction::RemoveMember)?;

    let member = fetch_member_pair(pool, user_id, lab_id)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))?;

    if member.lab_role_id == sentinel_role_id {
        return Err(AppError::conflict("member is already removed"));
    }

    sqlx::query("UPDATE lab_members SET lab_role_id = ?, updated_at = ? WHERE id = ?")
        .bind(sentinel_role_id)
        .bind(utc_now())
        .bind(member.id)
        .execute(pool)
        .await?;

    fetch_member(pool, member.id).await
}

/// Move a member to a different real role. The sentinel is not assignable
/// through this path so "removed" never gets conflated with "demoted", and
/// a no-op change is rejected so callers can disable redundant submissions.
pub async fn change_role(
    pool: &SqlitePool,
    sentinel_role_id: Uuid,
    member_id: Uuid,
    new_role_id: Uuid,
    actor_user_id: Uuid,
) -> AppResult<DbLabMember> {
    let member = fetch_member(pool, member_id).await?;

    let actor = authz::resolve_actor(pool, actor_user_id, member.lab_id).await?;
    authz::authorize(&actor, LabAction::ChangeRole)?;

    let role = fetch_lab_role(pool, new_role_id).await?;
    if role.id == sentinel_role_id {
        return Err(AppError::bad_request(
            "the former-member role cannot be assigned; remove the member instead",
        ));
    }
    if member.lab_role_id == new_role_id {
        return Err(AppError::bad_request("member already has this role"));
    }

    sqlx::query("UPDATE lab_members SET lab_role_id = ?, updated_at = ? WHERE id = ?")
        .bind(new_role_id)
        .bind(utc_now())
        .bind(member.id)
        .execute(pool)
        .await?;

    fetch_member(pool, member.id).await
}

/// Toggle the induction flag. A second call reverses the first.
pub async fn set_induction(
    pool: &SqlitePool,
    member_id: Uuid,
    actor_user_id: Uuid,
) -> AppResult<DbLabMember> {
    let member = fetch_member(pool, member_id).await?;

    let actor = authz::resolve_actor(pool, actor_user_id, member.lab_id).await?;
    authz::authorize(&actor, LabAction::SetInduction)?;

    sqlx::query("UPDATE lab_members SET induction_done = NOT induction_done, updated_at = ? WHERE id = ?")
        .bind(utc_now())
        .bind(member.id)
        .execute(pool)
        .await?;

    fetch_member(pool, member.id).await
}

pub async fn set_pci(
    pool: &SqlitePool,
    member_id: Uuid,
    value: bool,
    actor_user_id: Uuid,
) -> AppResult<DbLabMember> {
    let member = fetch_member(pool, member_id).await?;

    let actor = authz::resolve_actor(pool, actor_user_id, member.lab_id).await?;
    authz::authorize(&actor, LabAction::SetPci)?;

    sqlx::query("UPDATE lab_members SET is_pci = ?, updated_at = ? WHERE id = ?")
        .bind(value)
        .bind(utc_now())
        .bind(member.id)
        .execute(pool)
        .await?;

    fetch_member(pool, member.id).await
}

/// Append a status entry and make it the single active one. Members may set
/// their own status; anyone else needs the manager gate.
pub async fn set_status(
    pool: &SqlitePool,
    member_id: Uuid,
    name: &str,
    actor_user_id: Uuid,
) -> AppResult<MemberStatus> {
    let member = fetch_member(pool, member_id).await?;

    if member.user_id != actor_user_id {
        let actor = authz::resolve_actor(pool, actor_user_id, member.lab_id).await?;
        authz::authorize(&actor, LabAction::SetMemberStatus)?;
    }

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE member_statuses SET is_active = FALSE WHERE member_id = ? AND is_active = TRUE")
        .bind(member.id)
        .execute(&mut *tx)
        .await?;

    let status_id = Uuid::new_v4();
    let now = utc_now();
    sqlx::query(
        "INSERT INTO member_statuses (id, member_id, name, is_active, created_at) VALUES (?, ?, ?, TRUE, ?)",
    )
    .bind(status_id)
    .bind(member.id)
    .bind(name)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(MemberStatus {
        id: status_id,
        member_id: member.id,
        name: name.to_string(),
        is_active: true,
        created_at: now,
    })
}

/// Active members of a lab with joined display fields, managers first.
pub async fn list_members(pool: &SqlitePool, lab_id: Uuid) -> AppResult<Vec<LabMemberDetail>> {
    fetch_lab(pool, lab_id).await?;

    let members = sqlx::query_as::<_, LabMemberDetail>(
        "SELECT m.id, m.user_id, m.lab_id, u.display_name, u.email, lr.name AS role_name, lr.permission_level, m.induction_done, m.is_pci, \
           (SELECT s.name FROM member_statuses s WHERE s.member_id = m.id AND s.is_active = TRUE LIMIT 1) AS status \
         FROM lab_members m \
         INNER JOIN users u ON u.id = m.user_id \
         INNER JOIN lab_roles lr ON lr.id = m.lab_role_id \
         WHERE m.lab_id = ? AND lr.permission_level >= 0 \
         ORDER BY lr.permission_level DESC, u.display_name",
    )
    .bind(lab_id)
    .fetch_all(pool)
    .await?;

    Ok(members)
}

/// Users addable to a lab: no membership row, or a sentinel-roled one. The
/// latter are tagged `is_former_member` so the caller can present
/// "reactivate" instead of "add".
pub async fn list_available_users(
    pool: &SqlitePool,
    sentinel_role_id: Uuid,
    lab_id: Uuid,
    query: &AvailableUsersQuery,
    actor_user_id: Uuid,
) -> AppResult<(Vec<AvailableUser>, Pagination)> {
    let actor = authz::resolve_actor(pool, actor_user_id, lab_id).await?;
    authz::authorize(&actor, LabAction::ListAvailableUsers)?;

    fetch_lab(pool, lab_id).await?;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let search = query.search.clone().unwrap_or_default();
    let pattern = format!("%{}%", search);

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM users u \
         LEFT JOIN lab_members m ON m.user_id = u.id AND m.lab_id = ? \
         WHERE (m.id IS NULL OR m.lab_role_id = ?) \
           AND (? = '' OR u.display_name LIKE ? OR u.email LIKE ?)",
    )
    .bind(lab_id)
    .bind(sentinel_role_id)
    .bind(&search)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, AvailableUserRow>(
        "SELECT u.id, u.display_name, u.email, (m.id IS NOT NULL) AS is_former_member \
         FROM users u \
         LEFT JOIN lab_members m ON m.user_id = u.id AND m.lab_id = ? \
         WHERE (m.id IS NULL OR m.lab_role_id = ?) \
           AND (? = '' OR u.display_name LIKE ? OR u.email LIKE ?) \
         ORDER BY u.display_name \
         LIMIT ? OFFSET ?",
    )
    .bind(lab_id)
    .bind(sentinel_role_id)
    .bind(&search)
    .bind(&pattern)
    .bind(&pattern)
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    let users = rows
        .into_iter()
        .map(|row| AvailableUser {
            id: row.id,
            display_name: row.display_name,
            email: row.email,
            is_former_member: row.is_former_member,
        })
        .collect();

    let total_pages = if total == 0 { 0 } else { (total + page_size - 1) / page_size };
    let pagination = Pagination {
        page,
        page_size,
        total,
        total_pages,
    };

    Ok((users, pagination))
}

#[derive(sqlx::FromRow)]
struct AvailableUserRow {
    id: Uuid,
    display_name: String,
    email: String,
    is_former_member: bool,
}

pub async fn fetch_member<'e, E>(executor: E, member_id: Uuid) -> AppResult<DbLabMember>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM lab_members WHERE id = ?");
    sqlx::query_as::<_, DbLabMember>(&sql)
        .bind(member_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::not_found("member not found"))
}

pub async fn fetch_member_pair<'e, E>(
    executor: E,
    user_id: Uuid,
    lab_id: Uuid,
) -> AppResult<Option<DbLabMember>>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM lab_members WHERE user_id = ? AND lab_id = ?");
    let member = sqlx::query_as::<_, DbLabMember>(&sql)
        .bind(user_id)
        .bind(lab_id)
        .fetch_optional(executor)
        .await?;

    Ok(member)
}

pub async fn fetch_lab(pool: &SqlitePool, lab_id: Uuid) -> AppResult<Lab> {
    sqlx::query_as::<_, Lab>(
        "SELECT id, name, location, status, created_at, updated_at FROM labs WHERE id = ?",
    )
    .bind(lab_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("lab not found"))
}

pub async fn fetch_lab_role(pool: &SqlitePool, role_id: Uuid) -> AppResult<LabRole> {
    sqlx::query_as::<_, LabRole>(
        "SELECT id, name, permission_level FROM lab_roles WHERE id = ?",
    )
    .bind(role_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("lab role not found"))
}

/// True when the user holds an active (non-sentinel) membership in the lab.
pub async fn is_active_member(pool: &SqlitePool, user_id: Uuid, lab_id: Uuid) -> AppResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(1) FROM lab_members m \
         INNER JOIN lab_roles lr ON lr.id = m.lab_role_id \
         WHERE m.user_id = ? AND m.lab_id = ? AND lr.permission_level >= 0",
    )
    .bind(user_id)
    .bind(lab_id)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}
