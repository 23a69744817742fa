use axum::{extract::State, response::Json};

use crate::services::dashboard::DashboardSummary;
use crate::{ApiResponse, ApiResult, AppState};

/// Plant-wide counters for the supervisor screen
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/summary",
    responses(
        (status = 200, description = "Summary computed", body = ApiResponse<DashboardSummary>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "dashboard"
)]
pub async fn summary(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let summary = state.services.dashboard.summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}
