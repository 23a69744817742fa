use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::stoppage_reason;
use crate::services::catalog::ReasonRequest;
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// Filter shared by both reason lists.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReasonFilter {
    /// Hide deactivated reasons (what the floor screens offer)
    #[serde(default)]
    pub active_only: bool,
}

#[utoipa::path(
    get,
    path = "/api/v1/stoppage-reasons",
    params(ListQuery, ReasonFilter),
    responses(
        (status = 200, description = "Stoppage reasons retrieved", body = ApiResponse<PaginatedResponse<stoppage_reason::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn list_stoppage_reasons(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ReasonFilter>,
) -> ApiResult<PaginatedResponse<stoppage_reason::Model>> {
    let (page, limit) = state.page_params(&query);
    let reasons = state
        .services
        .catalog
        .list_stoppage_reasons(filter.active_only, query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(reasons)))
}

#[utoipa::path(
    get,
    path = "/api/v1/stoppage-reasons/{id}",
    params(("id" = Uuid, Path, description = "Stoppage reason ID")),
    responses(
        (status = 200, description = "Stoppage reason retrieved", body = ApiResponse<stoppage_reason::Model>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn get_stoppage_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<stoppage_reason::Model> {
    let reason = state.services.catalog.get_stoppage_reason(id).await?;
    Ok(Json(ApiResponse::success(reason)))
}

#[utoipa::path(
    post,
    path = "/api/v1/stoppage-reasons",
    request_body = ReasonRequest,
    responses(
        (status = 201, description = "Stoppage reason created", body = ApiResponse<stoppage_reason::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already used", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn create_stoppage_reason(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<ReasonRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let reason = state.services.catalog.create_stoppage_reason(request).await?;
    Ok(created_response(reason))
}

#[utoipa::path(
    put,
    path = "/api/v1/stoppage-reasons/{id}",
    params(("id" = Uuid, Path, description = "Stoppage reason ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Stoppage reason updated", body = ApiResponse<stoppage_reason::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn update_stoppage_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<ReasonRequest>,
) -> ApiResult<stoppage_reason::Model> {
    let reason = state
        .services
        .catalog
        .update_stoppage_reason(id, request)
        .await?;
    Ok(Json(ApiResponse::success(reason)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/stoppage-reasons/{id}",
    params(("id" = Uuid, Path, description = "Stoppage reason ID")),
    responses(
        (status = 204, description = "Stoppage reason deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Reason is referenced by stoppages", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "catalog"
)]
pub async fn delete_stoppage_reason(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.delete_stoppage_reason(id).await?;
    Ok(no_content_response())
}
