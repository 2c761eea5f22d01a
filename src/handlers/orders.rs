use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use super::common::{created_response, success_response};
use crate::{
    auth::{AdminUser, AuthUser},
    entities::order::OrderStatus,
    errors::ServiceError,
    services::{
        commerce::{checkout_service::PaymentIntentQuote, PlaceOrderInput},
        orders::OrderDetails,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// One of pending, processing, shipped, delivered, cancelled
    #[schema(example = "shipped")]
    pub status: String,
}

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("canceled") {
        return Ok(OrderStatus::Cancelled);
    }
    trimmed
        .parse::<OrderStatus>()
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {}", trimmed)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/create-payment-intent",
    summary = "Create payment intent",
    description = "Creates a card payment intent for the current cart total",
    responses(
        (status = 200, description = "Intent created", body = ApiResponse<PaymentIntentQuote>),
        (status = 400, description = "Cart is empty", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<PaymentIntentQuote> {
    let intent = state
        .services
        .checkout
        .create_payment_intent(user.user_id)
        .await?;
    Ok(success_response(intent))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Turns the caller's cart into an order. Card payments need a succeeded payment intent.",
    request_body = PlaceOrderInput,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<OrderDetails>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Empty cart, insufficient stock or unconfirmed payment", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PlaceOrderInput>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetails>>), ServiceError> {
    let order = state
        .services
        .checkout
        .place_order(user.user_id, payload)
        .await?;
    Ok(created_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List my orders",
    description = "The caller's orders, newest first",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderDetails>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<OrderDetails>> {
    let orders = state.services.orders.find_all_for_user(user.user_id).await?;
    Ok(success_response(orders))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "An order owned by the caller; admins may read any order",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetails>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<OrderDetails> {
    let order = state
        .services
        .orders
        .find_by_id(id, user.order_scope())
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/track/{order_number}",
    summary = "Track order",
    description = "Public lookup by order number",
    params(("order_number" = String, Path, description = "Order number, e.g. ORD-20240101-AB12")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderDetails>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> ApiResult<OrderDetails> {
    let order = state.services.checkout.track_order(&order_number).await?;
    Ok(success_response(order))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    params(("id" = i32, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderDetails>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderDetails> {
    let status = parse_status(&payload.status)?;
    let order = state
        .services
        .checkout
        .update_order_status(id, status)
        .await?;
    Ok(success_response(order))
}
