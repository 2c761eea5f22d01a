use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `Bearer` scheme referenced by protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Cart, checkout and order management for a single store.

## Authentication

Customer and admin endpoints take an HS256 JWT in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

The token subject is the numeric user id; `role` is `user` or `admin`.
Order tracking, store settings and health checks are public.

## Checkout

1. `POST /orders/create-payment-intent` for card payments
2. Confirm the intent client-side
3. `POST /orders` with the intent id

Every other payment method creates a `pending` order directly.

## Error Handling

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock for product: Walnut Desk",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Orders", description = "Checkout and order lookup endpoints"),
        (name = "Settings", description = "Store pricing settings"),
        (name = "Admin", description = "Administrative endpoints"),
        (name = "Analytics", description = "Dashboard metrics"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::quote_cart,
        crate::handlers::cart::add_cart_line,
        crate::handlers::cart::remove_cart_line,
        crate::handlers::cart::clear_cart,

        // Orders
        crate::handlers::orders::create_payment_intent,
        crate::handlers::orders::place_order,
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::track_order,
        crate::handlers::orders::update_order_status,

        // Settings
        crate::handlers::settings::get_settings,
        crate::handlers::settings::update_settings,

        // Admin
        crate::handlers::admin::list_all_orders,
        crate::handlers::admin::delete_order,
        crate::handlers::admin::dashboard,

        // Health
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::entities::order::OrderStatus,
            crate::entities::cart_item::Model,
            crate::services::commerce::Quote,
            crate::services::commerce::AddCartLineInput,
            crate::services::commerce::PlaceOrderInput,
            crate::services::commerce::checkout_service::PaymentIntentQuote,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderItemView,
            crate::services::settings::PricingSettings,
            crate::services::settings::UpdateSettingsInput,
            crate::services::analytics::DashboardMetrics,
            crate::services::analytics::SalesMetrics,
            crate::services::analytics::InventoryMetrics,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::health::HealthResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
