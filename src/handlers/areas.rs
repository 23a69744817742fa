use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::area;
use crate::services::plant::AreaRequest;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List plant areas
#[utoipa::path(
    get,
    path = "/api/v1/areas",
    params(ListQuery),
    responses(
        (status = 200, description = "Areas retrieved", body = ApiResponse<PaginatedResponse<area::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn list_areas(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<area::Model>> {
    let (page, limit) = state.page_params(&query);
    let areas = state
        .services
        .plant
        .list_areas(query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(areas)))
}

/// Get an area
#[utoipa::path(
    get,
    path = "/api/v1/areas/{id}",
    params(("id" = Uuid, Path, description = "Area ID")),
    responses(
        (status = 200, description = "Area retrieved", body = ApiResponse<area::Model>),
        (status = 404, description = "Area not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn get_area(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<area::Model> {
    let area = state.services.plant.get_area(id).await?;
    Ok(Json(ApiResponse::success(area)))
}

/// Create an area
#[utoipa::path(
    post,
    path = "/api/v1/areas",
    request_body = AreaRequest,
    responses(
        (status = 201, description = "Area created", body = ApiResponse<area::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn create_area(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AreaRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let area = state.services.plant.create_area(request).await?;
    Ok(created_response(area))
}

/// Update an area
#[utoipa::path(
    put,
    path = "/api/v1/areas/{id}",
    params(("id" = Uuid, Path, description = "Area ID")),
    request_body = AreaRequest,
    responses(
        (status = 200, description = "Area updated", body = ApiResponse<area::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Area not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn update_area(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<AreaRequest>,
) -> ApiResult<area::Model> {
    let area = state.services.plant.update_area(id, request).await?;
    Ok(Json(ApiResponse::success(area)))
}

/// Delete an area without sectors
#[utoipa::path(
    delete,
    path = "/api/v1/areas/{id}",
    params(("id" = Uuid, Path, description = "Area ID")),
    responses(
        (status = 204, description = "Area deleted"),
        (status = 404, description = "Area not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Area still has sectors", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn delete_area(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.plant.delete_area(id).await?;
    Ok(no_content_response())
}
