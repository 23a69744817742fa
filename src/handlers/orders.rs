use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, ValidatedJson};
use crate::entities::production_order;
use crate::services::{
    order_import::{ImportSummary, ImportTrigger},
    orders::{CancelOrderRequest, CreateOrderRequest, OrderFilter, UpdateOrderRequest},
};
use crate::{errors::ServiceError, ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

/// List production orders
///
/// Newest order numbers first. `search` matches product code, description
/// or the exact order number.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListQuery, OrderFilter),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<production_order::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<PaginatedResponse<production_order::Model>> {
    let (page, limit) = state.page_params(&query);
    let orders = state
        .services
        .orders
        .list_orders(filter, query.search, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<production_order::Model>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<production_order::Model> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Look up an order by the number printed on the traveler
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{number}",
    params(("number" = i64, Path, description = "Production order number")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<production_order::Model>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(number): Path<i64>,
) -> ApiResult<production_order::Model> {
    let order = state.services.orders.get_order_by_number(number).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Register an order by hand. It starts OPEN in the default stage unless
/// another stage is given.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<production_order::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or stage not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order number already exists", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.orders.create_order(request).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Order updated", body = ApiResponse<production_order::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is finished or cancelled", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<UpdateOrderRequest>,
) -> ApiResult<production_order::Model> {
    let order = state.services.orders.update_order(id, request).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order has tracking history", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.orders.delete_order(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<production_order::Model>),
        (status = 400, description = "Inactive reason", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order or reason not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already closed or still running", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(request): ValidatedJson<CancelOrderRequest>,
) -> ApiResult<production_order::Model> {
    let order = state
        .services
        .orders
        .cancel_order(id, request.reason_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Pull open orders from the ERP now
#[utoipa::path(
    post,
    path = "/api/v1/orders/import",
    responses(
        (status = 200, description = "Import finished", body = ApiResponse<ImportSummary>),
        (status = 409, description = "An import is already running", body = crate::errors::ErrorResponse),
        (status = 502, description = "ERP unavailable or not configured", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn import_orders(State(state): State<AppState>) -> ApiResult<ImportSummary> {
    let summary = state
        .services
        .order_import
        .run(ImportTrigger::Manual)
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}
