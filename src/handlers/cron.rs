use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Json,
};
use tracing::warn;

use crate::services::order_import::{ImportSummary, ImportTrigger};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState};

/// Scheduled ERP import, authenticated with the shared cron secret instead of
/// a user session. Without a configured secret the endpoint stays closed.
#[utoipa::path(
    post,
    path = "/api/v1/cron/import-orders",
    responses(
        (status = 200, description = "Import finished", body = ApiResponse<ImportSummary>),
        (status = 401, description = "Missing or wrong cron secret", body = crate::errors::ErrorResponse),
        (status = 409, description = "An import is already running", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP unavailable or not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "orders"
)]
pub async fn import_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<ImportSummary> {
    let expected = state
        .config
        .cron_secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("Cron trigger is disabled".into()))?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if !presented.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes())) {
        warn!("cron import rejected: bad or missing secret");
        return Err(ServiceError::Unauthorized("Invalid cron secret".into()));
    }

    let summary = state
        .services
        .order_import
        .run(ImportTrigger::Cron)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::constant_time_eq;

    #[test]
    fn secret_comparison() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cret!"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
