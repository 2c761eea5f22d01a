use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use super::common::{no_content_response, success_response};
use crate::{
    auth::AdminUser, errors::ServiceError, services::analytics::DashboardMetrics,
    services::orders::OrderDetails, ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/admin/orders",
    summary = "List all orders",
    description = "Every order in the store, newest first",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderDetails>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Vec<OrderDetails>> {
    let orders = state.services.orders.find_all().await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    delete,
    path = "/api/v1/admin/orders/{id}",
    summary = "Delete order",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 204, description = "Order deleted"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.checkout.delete_order(id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/dashboard",
    summary = "Dashboard metrics",
    description = "Order counts, revenue and stock levels, refreshed on every order event",
    responses(
        (status = 200, description = "Metrics retrieved", body = ApiResponse<DashboardMetrics>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Analytics"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<DashboardMetrics> {
    let metrics = state.services.analytics.dashboard().await?;
    Ok(success_response(metrics))
}
