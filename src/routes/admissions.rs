use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::admission;
use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::admission::{
    AdmissionDetail, ApprovalResponse, ApproveAdmissionRequest, LabAdmission,
    RequestAdmissionRequest,
};
use crate::models::member::LabMember;

#[utoipa::path(
    post,
    path = "/api/labs/{lab_id}/admissions",
    tag = "Admissions",
    params(("lab_id" = Uuid, Path, description = "Lab id")),
    request_body = RequestAdmissionRequest,
    responses(
        (status = 201, description = "Admission requested", body = LabAdmission),
        (status = 404, description = "Lab or role not found"),
        (status = 409, description = "Already a member or a request is already pending")
    )
)]
pub async fn request_admission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(lab_id): Path<Uuid>,
    Json(payload): Json<RequestAdmissionRequest>,
) -> AppResult<(StatusCode, Json<LabAdmission>)> {
    let admission = admission::request(
        &state.pool,
        state.sentinel_role_id,
        lab_id,
        auth.user_id,
        payload.role_id,
    )
    .await?;
    let admission: LabAdmission = admission.try_into()?;

    log_activity(&state.event_bus, "requested", Some(auth.user_id), &admission);

    Ok((StatusCode::CREATED, Json(admission)))
}

#[utoipa::path(
    get,
    path = "/api/labs/{lab_id}/admissions",
    tag = "Admissions",
    params(("lab_id" = Uuid, Path, description = "Lab id")),
    responses(
        (status = 200, description = "Admissions for the lab, newest first", body = [AdmissionDetail]),
        (status = 403, description = "Not a manager of this lab")
    )
)]
pub async fn list_lab_admissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(lab_id): Path<Uuid>,
) -> AppResult<Json<Vec<AdmissionDetail>>> {
    let admissions = admission::list_for_lab(&state.pool, lab_id, auth.user_id).await?;
    Ok(Json(admissions))
}

#[utoipa::path(
    get,
    path = "/api/admissions/mine",
    tag = "Admissions",
    responses((status = 200, description = "Caller's admission history, newest first", body = [AdmissionDetail]))
)]
pub async fn list_my_admissions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<AdmissionDetail>>> {
    let admissions = admission::list_mine(&state.pool, auth.user_id).await?;
    Ok(Json(admissions))
}

#[utoipa::path(
    post,
    path = "/api/admissions/{id}/approve",
    tag = "Admissions",
    params(("id" = Uuid, Path, description = "Admission id")),
    request_body = ApproveAdmissionRequest,
    responses(
        (status = 200, description = "Admission approved, membership materialized", body = ApprovalResponse),
        (status = 403, description = "Not authorized"),
        (status = 409, description = "Admission is not pending")
    )
)]
pub async fn approve_admission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApproveAdmissionRequest>,
) -> AppResult<Json<ApprovalResponse>> {
    let (admission, member) = admission::approve(
        &state.pool,
        state.sentinel_role_id,
        id,
        auth.user_id,
        payload.role_id,
        payload.is_pci,
    )
    .await?;

    let admission: LabAdmission = admission.try_into()?;
    let member: LabMember = member.try_into()?;

    log_activity(&state.event_bus, "approved", Some(auth.user_id), &admission);
    log_activity(&state.event_bus, "materialized", Some(auth.user_id), &member);

    Ok(Json(ApprovalResponse { admission, member }))
}

#[utoipa::path(
    post,
    path = "/api/admissions/{id}/reject",
    tag = "Admissions",
    params(("id" = Uuid, Path, description = "Admission id")),
    responses(
        (status = 200, description = "Admission rejected", body = LabAdmission),
        (status = 403, description = "Not authorized"),
        (status = 409, description = "Admission is not pending")
    )
)]
pub async fn reject_admission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LabAdmission>> {
    let admission = admission::reject(&state.pool, id, auth.user_id).await?;
    let admission: LabAdmission = admission.try_into()?;

    log_activity(&state.event_bus, "rejected", Some(auth.user_id), &admission);

    Ok(Json(admission))
}

#[utoipa::path(
    post,
    path = "/api/admissions/{id}/withdraw",
    tag = "Admissions",
    params(("id" = Uuid, Path, description = "Admission id")),
    responses(
        (status = 200, description = "Admission withdrawn", body = LabAdmission),
        (status = 403, description = "Not the requester"),
        (status = 409, description = "Admission is not pending")
    )
)]
pub async fn withdraw_admission(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LabAdmission>> {
    let admission = admission::withdraw(&state.pool, id, auth.user_id).await?;
    let admission: LabAdmission = admission.try_into()?;

    log_activity(&state.event_bus, "withdrawn", Some(auth.user_id), &admission);

    Ok(Json(admission))
}
