use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::sector;
use crate::services::plant::SectorRequest;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SectorFilter {
    /// Only sectors of this area
    pub area_id: Option<Uuid>,
}

/// List sectors
#[utoipa::path(
    get,
    path = "/api/v1/sectors",
    params(ListQuery, SectorFilter),
    responses(
        (status = 200, description = "Sectors retrieved", body = ApiResponse<PaginatedResponse<sector::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn list_sectors(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<SectorFilter>,
) -> ApiResult<PaginatedResponse<sector::Model>> {
    let (page, limit) = state.page_params(&query);
    let sectors = state
        .services
        .plant
        .list_sectors(filter.area_id, query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(sectors)))
}

/// Get a sector
#[utoipa::path(
    get,
    path = "/api/v1/sectors/{id}",
    params(("id" = Uuid, Path, description = "Sector ID")),
    responses(
        (status = 200, description = "Sector retrieved", body = ApiResponse<sector::Model>),
        (status = 404, description = "Sector not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn get_sector(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<sector::Model> {
    let sector = state.services.plant.get_sector(id).await?;
    Ok(Json(ApiResponse::success(sector)))
}

/// Create a sector inside an area
#[utoipa::path(
    post,
    path = "/api/v1/sectors",
    request_body = SectorRequest,
    responses(
        (status = 201, description = "Sector created", body = ApiResponse<sector::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Area not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Name already used in the area", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn create_sector(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SectorRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let sector = state.services.plant.create_sector(request).await?;
    Ok(created_response(sector))
}

/// Update a sector
#[utoipa::path(
    put,
    path = "/api/v1/sectors/{id}",
    params(("id" = Uuid, Path, description = "Sector ID")),
    request_body = SectorRequest,
    responses(
        (status = 200, description = "Sector updated", body = ApiResponse<sector::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sector or area not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn update_sector(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<SectorRequest>,
) -> ApiResult<sector::Model> {
    let sector = state.services.plant.update_sector(id, request).await?;
    Ok(Json(ApiResponse::success(sector)))
}

/// Delete a sector; machine memberships go with it
#[utoipa::path(
    delete,
    path = "/api/v1/sectors/{id}",
    params(("id" = Uuid, Path, description = "Sector ID")),
    responses(
        (status = 204, description = "Sector deleted"),
        (status = 404, description = "Sector not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "plant"
)]
pub async fn delete_sector(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.plant.delete_sector(id).await?;
    Ok(no_content_response())
}
