use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::stage;
use crate::services::catalog::StageRequest;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StageFilter {
    /// Only stages shown on the kanban board
    #[serde(default)]
    pub board_only: bool,
}

/// List stages in display order
#[utoipa::path(
    get,
    path = "/api/v1/stages",
    params(ListQuery, StageFilter),
    responses(
        (status = 200, description = "Stages retrieved", body = ApiResponse<PaginatedResponse<stage::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn list_stages(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<StageFilter>,
) -> ApiResult<PaginatedResponse<stage::Model>> {
    let (page, limit) = state.page_params(&query);
    let stages = state
        .services
        .catalog
        .list_stages(filter.board_only, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(stages)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stages/{id}",
    params(("id" = Uuid, Path, description = "Stage ID")),
    responses(
        (status = 200, description = "Stage retrieved", body = ApiResponse<stage::Model>),
        (status = 404, description = "Stage not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn get_stage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<stage::Model> {
    let stage = state.services.catalog.get_stage(id).await?;
    Ok(Json(ApiResponse::success(stage)))
}

#[utoipa::path(
    post,
    path = "/api/v1/stages",
    request_body = StageRequest,
    responses(
        (status = 201, description = "Stage created", body = ApiResponse<stage::Model>),
        (status = 400, description = "Invalid payload or color", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn create_stage(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<StageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let stage = state.services.catalog.create_stage(request).await?;
    Ok(created_response(stage))
}

#[utoipa::path(
    put,
    path = "/api/v1/stages/{id}",
    params(("id" = Uuid, Path, description = "Stage ID")),
    request_body = StageRequest,
    responses(
        (status = 200, description = "Stage updated", body = ApiResponse<stage::Model>),
        (status = 400, description = "Invalid payload or color", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used, or the default stage code changed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn update_stage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<StageRequest>,
) -> ApiResult<stage::Model> {
    let stage = state.services.catalog.update_stage(id, request).await?;
    Ok(Json(ApiResponse::success(stage)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/stages/{id}",
    params(("id" = Uuid, Path, description = "Stage ID")),
    responses(
        (status = 204, description = "Stage deleted"),
        (status = 404, description = "Stage not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Default stage", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn delete_stage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.delete_stage(id).await?;
    Ok(no_content_response())
}
