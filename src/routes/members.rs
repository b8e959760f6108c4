use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::membership;
use crate::models::member::{
    AvailableUsersQuery, AvailableUsersResponse, ChangeRoleRequest, LabMember, LabMemberDetail,
    MemberStatus, SetPciRequest, SetStatusRequest,
};

#[utoipa::path(
    get,
    path = "/api/labs/{lab_id}/members",
    tag = "Members",
    params(("lab_id" = Uuid, Path, description = "Lab id")),
    responses(
        (status = 200, description = "Active members of the lab", body = [LabMemberDetail]),
        (status = 404, description = "Lab not found")
    )
)]
pub async fn list_members(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(lab_id): Path<Uuid>,
) -> AppResult<Json<Vec<LabMemberDetail>>> {
    let members = membership::list_members(&state.pool, lab_id).await?;
    Ok(Json(members))
}

#[utoipa::path(
    delete,
    path = "/api/labs/{lab_id}/members/{user_id}",
    tag = "Members",
    params(
        ("lab_id" = Uuid, Path, description = "Lab id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Member soft-removed (role re-pointed to sentinel)", body = LabMember),
        (status = 403, description = "Not authorized"),
        (status = 404, description = "Member not found"),
        (status = 409, description = "Member is already removed")
    )
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((lab_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<LabMember>> {
    let member = membership::remove(
        &state.pool,
        state.sentinel_role_id,
        lab_id,
        user_id,
        auth.user_id,
    )
    .await?;
    let member: LabMember = member.try_into()?;

    log_activity(&state.event_bus, "removed", Some(auth.user_id), &member);

    Ok(Json(member))
}

#[utoipa::path(
    put,
    path = "/api/members/{id}/role",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Member id")),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = LabMember),
        (status = 400, description = "Sentinel role or no-op change"),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeRoleRequest>,
) -> AppResult<Json<LabMember>> {
    let member = membership::change_role(
        &state.pool,
        state.sentinel_role_id,
        id,
        payload.role_id,
        auth.user_id,
    )
    .await?;
    let member: LabMember = member.try_into()?;

    log_activity(&state.event_bus, "role_changed", Some(auth.user_id), &member);

    Ok(Json(member))
}

#[utoipa::path(
    post,
    path = "/api/members/{id}/induction",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Member id")),
    responses(
        (status = 200, description = "Induction flag toggled", body = LabMember),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn toggle_induction(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LabMember>> {
    let member = membership::set_induction(&state.pool, id, auth.user_id).await?;
    let member: LabMember = member.try_into()?;

    log_activity(&state.event_bus, "induction_toggled", Some(auth.user_id), &member);

    Ok(Json(member))
}

#[utoipa::path(
    put,
    path = "/api/members/{id}/pci",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Member id")),
    request_body = SetPciRequest,
    responses(
        (status = 200, description = "PCI flag set", body = LabMember),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn set_pci(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPciRequest>,
) -> AppResult<Json<LabMember>> {
    let member = membership::set_pci(&state.pool, id, payload.value, auth.user_id).await?;
    let member: LabMember = member.try_into()?;

    log_activity(&state.event_bus, "pci_set", Some(auth.user_id), &member);

    Ok(Json(member))
}

#[utoipa::path(
    put,
    path = "/api/members/{id}/status",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Member id")),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Status set (previous active entry deactivated)", body = MemberStatus),
        (status = 403, description = "Not the member and not a manager")
    )
)]
pub async fn set_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> AppResult<Json<MemberStatus>> {
    let status = membership::set_status(&state.pool, id, &payload.name, auth.user_id).await?;
    Ok(Json(status))
}

#[utoipa::path(
    get,
    path = "/api/labs/{lab_id}/available-users",
    tag = "Members",
    params(
        ("lab_id" = Uuid, Path, description = "Lab id"),
        ("page" = Option<i64>, Query, description = "1-based page"),
        ("page_size" = Option<i64>, Query, description = "Page size (max 100)"),
        ("search" = Option<String>, Query, description = "Name/email filter")
    ),
    responses(
        (status = 200, description = "Users with no active membership in the lab", body = AvailableUsersResponse),
        (status = 403, description = "Not authorized")
    )
)]
pub async fn list_available_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(lab_id): Path<Uuid>,
    Query(query): Query<AvailableUsersQuery>,
) -> AppResult<Json<AvailableUsersResponse>> {
    let (users, pagination) = membership::list_available_users(
        &state.pool,
        state.sentinel_role_id,
        lab_id,
        &query,
        auth.user_id,
    )
    .await?;

    Ok(Json(AvailableUsersResponse { users, pagination }))
}
