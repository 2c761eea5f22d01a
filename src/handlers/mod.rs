pub mod admin;
pub mod cart;
pub mod common;
pub mod health;
pub mod orders;
pub mod settings;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        analytics::AnalyticsService,
        commerce::{CartService, CheckoutOptions, CheckoutService},
        orders::OrderLedger,
        payments::PaymentGateway,
        settings::{SettingsProvider, SettingsService},
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderLedger>,
    pub settings: Arc<SettingsService>,
    pub analytics: Arc<AnalyticsService>,
}

impl AppServices {
    /// Wires every service against one pool. Checkout reads its rates from
    /// the persisted store settings.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        payments: Arc<dyn PaymentGateway>,
        options: CheckoutOptions,
    ) -> Self {
        let settings = Arc::new(SettingsService::new(db_pool.clone()));
        let settings_provider: Arc<dyn SettingsProvider> = settings.clone();

        let checkout = CheckoutService::new(
            db_pool.clone(),
            event_sender,
            settings_provider,
            payments,
        )
        .with_options(options);

        Self {
            cart: Arc::new(CartService::new(db_pool.clone())),
            checkout: Arc::new(checkout),
            orders: Arc::new(OrderLedger::new(db_pool.clone())),
            settings,
            analytics: Arc::new(AnalyticsService::new(db_pool)),
        }
    }

    /// Replaces the checkout service, e.g. with one using a different order number source.
    pub fn with_checkout(mut self, checkout: CheckoutService) -> Self {
        self.checkout = Arc::new(checkout);
        self
    }
}
