use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::machine;
use crate::services::plant::{MachineDetail, MachineFilter, MachineRequest};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List machines
///
/// `search` matches code or name.
#[utoipa::path(
    get,
    path = "/api/v1/machines",
    params(ListQuery, MachineFilter),
    responses(
        (status = 200, description = "Machines retrieved", body = ApiResponse<PaginatedResponse<machine::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn list_machines(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<MachineFilter>,
) -> ApiResult<PaginatedResponse<machine::Model>> {
    let (page, limit) = state.page_params(&query);
    let machines = state
        .services
        .plant
        .list_machines(filter, query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(machines)))
}

/// Get a machine with its sectors
#[utoipa::path(
    get,
    path = "/api/v1/machines/{id}",
    params(("id" = Uuid, Path, description = "Machine ID")),
    responses(
        (status = 200, description = "Machine retrieved", body = ApiResponse<MachineDetail>),
        (status = 404, description = "Machine not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn get_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<MachineDetail> {
    let machine = state.services.plant.get_machine(id).await?;
    Ok(Json(ApiResponse::success(machine)))
}

/// Register a machine. It starts AVAILABLE.
#[utoipa::path(
    post,
    path = "/api/v1/machines",
    request_body = MachineRequest,
    responses(
        (status = 201, description = "Machine created", body = ApiResponse<MachineDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sector not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn create_machine(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<MachineRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let machine = state.services.plant.create_machine(request).await?;
    Ok(created_response(machine))
}

/// Update machine data and sector membership. Status is owned by tracking.
#[utoipa::path(
    put,
    path = "/api/v1/machines/{id}",
    params(("id" = Uuid, Path, description = "Machine ID")),
    request_body = MachineRequest,
    responses(
        (status = 200, description = "Machine updated", body = ApiResponse<MachineDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Machine or sector not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn update_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<MachineRequest>,
) -> ApiResult<MachineDetail> {
    let machine = state.services.plant.update_machine(id, request).await?;
    Ok(Json(ApiResponse::success(machine)))
}

/// Delete a machine without tracking history
#[utoipa::path(
    delete,
    path = "/api/v1/machines/{id}",
    params(("id" = Uuid, Path, description = "Machine ID")),
    responses(
        (status = 204, description = "Machine deleted"),
        (status = 404, description = "Machine not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Machine has history", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn delete_machine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.plant.delete_machine(id).await?;
    Ok(no_content_response())
}
