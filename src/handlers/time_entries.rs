//! Shop-floor tracking endpoints.
//!
//! Every write moves the machine through its state machine and returns the
//! entry together with the machine as it stands afterwards. The session user
//! is recorded as operator unless the request names another one.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::common::ValidatedJson;
use crate::auth::AuthUser;
use crate::entities::time_entry;
use crate::services::tracking::{
    EntryFilter, FinishEntryRequest, OpenEntries, StartProductionRequest, StartStoppageRequest,
    TrackingResult,
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List time entries, most recent first
#[utoipa::path(
    get,
    path = "/api/v1/time-entries",
    params(ListQuery, EntryFilter),
    responses(
        (status = 200, description = "Time entries retrieved", body = ApiResponse<PaginatedResponse<time_entry::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<EntryFilter>,
) -> ApiResult<PaginatedResponse<time_entry::Model>> {
    let (page, limit) = state.page_params(&query);
    let entries = state
        .services
        .tracking
        .list_entries(filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

#[utoipa::path(
    get,
    path = "/api/v1/time-entries/{id}",
    params(("id" = Uuid, Path, description = "Time entry ID")),
    responses(
        (status = 200, description = "Time entry retrieved", body = ApiResponse<time_entry::Model>),
        (status = 404, description = "Time entry not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<time_entry::Model> {
    let entry = state.services.tracking.get_entry(id).await?;
    Ok(Json(ApiResponse::success(entry)))
}

/// The machine with its running production run and open stoppage, if any
#[utoipa::path(
    get,
    path = "/api/v1/machines/{id}/open-entries",
    params(("id" = Uuid, Path, description = "Machine ID")),
    responses(
        (status = 200, description = "Open entries retrieved", body = ApiResponse<OpenEntries>),
        (status = 404, description = "Machine not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn open_entries(
    State(state): State<AppState>,
    Path(machine_id): Path<Uuid>,
) -> ApiResult<OpenEntries> {
    let open = state.services.tracking.open_entries(machine_id).await?;
    Ok(Json(ApiResponse::success(open)))
}

/// Start producing an order on a machine
#[utoipa::path(
    post,
    path = "/api/v1/time-entries/production",
    request_body = StartProductionRequest,
    responses(
        (status = 201, description = "Production started", body = ApiResponse<TrackingResult>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Machine, order, stage or operator not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Machine busy or order closed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn start_production(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ValidatedJson(request): ValidatedJson<StartProductionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .tracking
        .start_production(request, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result))))
}

/// Open a stoppage that interrupts a running production entry
#[utoipa::path(
    post,
    path = "/api/v1/time-entries/{id}/stoppages",
    params(("id" = Uuid, Path, description = "Production entry ID")),
    request_body = StartStoppageRequest,
    responses(
        (status = 201, description = "Stoppage started", body = ApiResponse<TrackingResult>),
        (status = 400, description = "Invalid payload or inactive reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Entry or reason not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry closed or machine already stopped", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn start_stoppage_from_entry(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<StartStoppageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .tracking
        .start_stoppage_from_entry(entry_id, request, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result))))
}

/// Stop a machine directly, with or without a running order
#[utoipa::path(
    post,
    path = "/api/v1/machines/{id}/stoppages",
    params(("id" = Uuid, Path, description = "Machine ID")),
    request_body = StartStoppageRequest,
    responses(
        (status = 201, description = "Stoppage started", body = ApiResponse<TrackingResult>),
        (status = 400, description = "Invalid payload or inactive reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Machine or reason not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Machine already stopped", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn start_machine_stoppage(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(machine_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<StartStoppageRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let result = state
        .services
        .tracking
        .start_machine_stoppage(machine_id, request, auth_user.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(result))))
}

/// Close a production run or a stoppage
#[utoipa::path(
    post,
    path = "/api/v1/time-entries/{id}/finish",
    params(("id" = Uuid, Path, description = "Time entry ID")),
    request_body = FinishEntryRequest,
    responses(
        (status = 200, description = "Entry finished", body = ApiResponse<TrackingResult>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Entry not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Entry already finished", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "tracking"
)]
pub async fn finish_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<FinishEntryRequest>,
) -> ApiResult<TrackingResult> {
    let result = state
        .services
        .tracking
        .finish_entry(entry_id, request)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}
