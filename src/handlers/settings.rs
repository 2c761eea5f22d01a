use axum::{extract::State, response::Json};

use super::common::success_response;
use crate::{
    auth::AdminUser,
    services::settings::{PricingSettings, UpdateSettingsInput},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/settings",
    summary = "Store settings",
    description = "Tax rate and flat shipping fee applied at checkout",
    responses(
        (status = 200, description = "Settings retrieved", body = ApiResponse<PricingSettings>),
    ),
    tag = "Settings"
)]
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<PricingSettings> {
    let settings = state.services.settings.get().await?;
    Ok(success_response(settings))
}

#[utoipa::path(
    put,
    path = "/api/v1/admin/settings",
    summary = "Update store settings",
    request_body = UpdateSettingsInput,
    responses(
        (status = 200, description = "Settings updated", body = ApiResponse<PricingSettings>),
        (status = 400, description = "Negative rate or fee", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<UpdateSettingsInput>,
) -> ApiResult<PricingSettings> {
    let settings = state.services.settings.update(payload).await?;
    Ok(success_response(settings))
}
