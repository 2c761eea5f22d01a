use axum::{http::StatusCode, response::Json};
use serde::Serialize;

use crate::ApiResponse;

/// 200 with the standard envelope
pub fn success_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

/// 201 with the standard envelope
pub fn created_response<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::success(data)))
}

/// 204 with no body
pub fn no_content_response() -> StatusCode {
    StatusCode::NO_CONTENT
}
