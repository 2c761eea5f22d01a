use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::common::{created_response, no_content_response, success_response};
use crate::{
    auth::AuthUser,
    entities::cart_item,
    errors::ServiceError,
    services::commerce::{AddCartLineInput, Quote},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get cart",
    description = "Lines in the caller's cart, oldest first",
    responses(
        (status = 200, description = "Cart retrieved", body = ApiResponse<Vec<cart_item::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<cart_item::Model>> {
    let lines = state.services.cart.get_lines(user.user_id).await?;
    Ok(success_response(lines))
}

#[utoipa::path(
    get,
    path = "/api/v1/cart/quote",
    summary = "Quote cart",
    description = "Subtotal, tax, shipping and total for the caller's cart under the current store settings",
    responses(
        (status = 200, description = "Quote computed", body = ApiResponse<Quote>),
        (status = 400, description = "Cart is empty", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn quote_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<Quote> {
    let quote = state.services.checkout.quote_cart(user.user_id).await?;
    Ok(success_response(quote))
}

#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add to cart",
    description = "Adds a product or variation; an existing matching line has its quantity increased",
    request_body = AddCartLineInput,
    responses(
        (status = 201, description = "Line saved", body = ApiResponse<cart_item::Model>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or variation not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_cart_line(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartLineInput>,
) -> Result<(StatusCode, Json<ApiResponse<cart_item::Model>>), ServiceError> {
    let line = state.services.cart.add_line(user.user_id, payload).await?;
    Ok(created_response(line))
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart/items/{id}",
    summary = "Remove from cart",
    params(("id" = i32, Path, description = "Cart line id")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.remove_line(user.user_id, id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    summary = "Empty cart",
    responses(
        (status = 204, description = "Cart emptied"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state.services.cart.clear(user.user_id).await?;
    Ok(no_content_response())
}
