use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::services::deep_links::DeepLink;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResolveQuery {
    /// Scanned path or full URL, e.g. `/m/<uuid>` or `/op/8209`
    pub path: String,
}

/// Build the shareable link for a machine, order or operator
#[utoipa::path(
    get,
    path = "/api/v1/deep-links/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "machine, order or operator"),
        ("id" = Uuid, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Link built", body = ApiResponse<DeepLink>),
        (status = 400, description = "Unknown kind", body = crate::errors::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "deep-links"
)]
pub async fn build_link(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> ApiResult<DeepLink> {
    let link = state.services.deep_links.build(&kind, id).await?;
    Ok(Json(ApiResponse::success(link)))
}

/// Resolve a scanned link back to its record
#[utoipa::path(
    get,
    path = "/api/v1/deep-links/resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Link resolved", body = ApiResponse<DeepLink>),
        (status = 400, description = "Malformed link", body = crate::errors::ErrorResponse),
        (status = 404, description = "Record not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "deep-links"
)]
pub async fn resolve_link(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<DeepLink> {
    let link = state.services.deep_links.resolve(&query.path).await?;
    Ok(Json(ApiResponse::success(link)))
}
