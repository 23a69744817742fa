use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use super::stoppage_reasons::ReasonFilter;
use crate::entities::cancellation_reason;
use crate::services::catalog::ReasonRequest;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

#[utoipa::path(
    get,
    path = "/api/v1/cancellation-reasons",
    params(ListQuery, ReasonFilter),
    responses(
        (status = 200, description = "Cancellation reasons retrieved", body = ApiResponse<PaginatedResponse<cancellation_reason::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn list_cancellation_reasons(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ReasonFilter>,
) -> ApiResult<PaginatedResponse<cancellation_reason::Model>> {
    let (page, limit) = state.page_params(&query);
    let reasons = state
        .services
        .catalog
        .list_cancellation_reasons(filter.active_only, query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(reasons)))
}

#[utoipa::path(
    get,
    path = "/api/v1/cancellation-reasons/{id}",
    params(("id" = Uuid, Path, description = "Cancellation reason ID")),
    responses(
        (status = 200, description = "Cancellation reason retrieved", body = ApiResponse<cancellation_reason::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn get_cancellation_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<cancellation_reason::Model> {
    let reason = state.services.catalog.get_cancellation_reason(id).await?;
    Ok(Json(ApiResponse::success(reason)))
}

#[utoipa::path(
    post,
    path = "/api/v1/cancellation-reasons",
    request_body = ReasonRequest,
    responses(
        (status = 201, description = "Cancellation reason created", body = ApiResponse<cancellation_reason::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn create_cancellation_reason(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ReasonRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let reason = state
        .services
        .catalog
        .create_cancellation_reason(request)
        .await?;
    Ok(created_response(reason))
}

#[utoipa::path(
    put,
    path = "/api/v1/cancellation-reasons/{id}",
    params(("id" = Uuid, Path, description = "Cancellation reason ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Cancellation reason updated", body = ApiResponse<cancellation_reason::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn update_cancellation_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ReasonRequest>,
) -> ApiResult<cancellation_reason::Model> {
    let reason = state
        .services
        .catalog
        .update_cancellation_reason(id, request)
        .await?;
    Ok(Json(ApiResponse::success(reason)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cancellation-reasons/{id}",
    params(("id" = Uuid, Path, description = "Cancellation reason ID")),
    responses(
        (status = 204, description = "Cancellation reason deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reason is referenced by orders", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn delete_cancellation_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.delete_cancellation_reason(id).await?;
    Ok(no_content_response())
}
