//! Storefront API Library
//!
//! Cart, checkout transaction, order ledger and admin order management for a
//! single-store shop.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;

pub use handlers::AppServices;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: AppServices,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: telemetry::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`. Role checks happen in the extractors.
pub fn api_v1_routes() -> Router<AppState> {
    let cart = Router::new()
        .route(
            "/cart",
            get(handlers::cart::get_cart).delete(handlers::cart::clear_cart),
        )
        .route("/cart/quote", get(handlers::cart::quote_cart))
        .route("/cart/items", post(handlers::cart::add_cart_line))
        .route("/cart/items/:id", delete(handlers::cart::remove_cart_line));

    let orders = Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_my_orders).post(handlers::orders::place_order),
        )
        .route(
            "/orders/create-payment-intent",
            post(handlers::orders::create_payment_intent),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/orders/track/:order_number",
            get(handlers::orders::track_order),
        );

    let settings = Router::new()
        .route("/settings", get(handlers::settings::get_settings))
        .route("/admin/settings", put(handlers::settings::update_settings));

    let admin = Router::new()
        .route("/admin/orders", get(handlers::admin::list_all_orders))
        .route("/admin/orders/:id", delete(handlers::admin::delete_order))
        .route("/admin/dashboard", get(handlers::admin::dashboard));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(cart)
        .merge(orders)
        .merge(settings)
        .merge(admin)
}
