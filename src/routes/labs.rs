use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::membership;
use crate::models::lab::Lab;
use crate::models::role::{LabRole, LabRoleListQuery};

#[utoipa::path(
    get,
    path = "/api/labs",
    tag = "Labs",
    responses((status = 200, description = "List labs", body = [Lab]))
)]
pub async fn list_labs(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Lab>>> {
    let labs = sqlx::query_as::<_, Lab>(
        "SELECT id, name, location, status, created_at, updated_at FROM labs ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(labs))
}

#[utoipa::path(
    get,
    path = "/api/labs/{lab_id}",
    tag = "Labs",
    params(("lab_id" = Uuid, Path, description = "Lab id")),
    responses(
        (status = 200, description = "Lab detail", body = Lab),
        (status = 404, description = "Lab not found")
    )
)]
pub async fn get_lab(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(lab_id): Path<Uuid>,
) -> AppResult<Json<Lab>> {
    let lab = membership::fetch_lab(&state.pool, lab_id).await?;
    Ok(Json(lab))
}

#[utoipa::path(
    get,
    path = "/api/lab-roles",
    tag = "Labs",
    params(("selectable" = Option<bool>, Query, description = "Exclude the Former Member sentinel")),
    responses((status = 200, description = "List lab roles", body = [LabRole]))
)]
pub async fn list_lab_roles(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<LabRoleListQuery>,
) -> AppResult<Json<Vec<LabRole>>> {
    // The sentinel must never feed a role picker; `selectable` is what the
    // admission and role-change UIs pass.
    let sql = if query.selectable {
        "SELECT id, name, permission_level FROM lab_roles WHERE permission_level >= 0 ORDER BY permission_level DESC"
    } else {
        "SELECT id, name, permission_level FROM lab_roles ORDER BY permission_level DESC"
    };

    let roles = sqlx::query_as::<_, LabRole>(sql).fetch_all(&state.pool).await?;
    Ok(Json(roles))
}
