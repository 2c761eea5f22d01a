#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use mockall::mock;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{issue_token, Claims, ADMIN_ROLE, USER_ROLE},
    config::AppConfig,
    db,
    entities::{cart_item, product, product_variation},
    errors::ServiceError,
    events::{self, EventHandler, EventSender},
    services::{
        commerce::{AddCartLineInput, CheckoutOptions, CheckoutService},
        order_number::OrderNumberGenerator,
        payments::{to_minor_units, PaymentGateway, PaymentIntent, PaymentIntentStatus},
        settings::{SettingsProvider, SettingsService, UpdateSettingsInput},
    },
    AppServices, AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

mock! {
    pub Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_intent(
            &self,
            amount: Decimal,
            currency: &str,
        ) -> Result<PaymentIntent, ServiceError>;

        async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntentStatus, ServiceError>;
    }
}

/// Gateway that remembers the intents it created and reports `status` for
/// each of them, along with the amount and currency it was created for.
/// Unknown intent ids are refused like the provider would.
pub fn gateway_reporting(status: &'static str) -> MockGateway {
    let intents: Arc<Mutex<HashMap<String, (i64, String)>>> = Arc::default();
    let created = intents.clone();

    let mut gateway = MockGateway::new();
    gateway.expect_create_intent().returning(move |amount, currency| {
        let mut known = created.lock().unwrap();
        let id = format!("pi_test_{}", known.len() + 1);
        known.insert(id.clone(), (to_minor_units(amount)?, currency.to_lowercase()));
        Ok(PaymentIntent {
            client_secret: format!("{}_secret_abc", id),
            id,
        })
    });
    gateway.expect_retrieve_intent().returning(move |id| {
        let (amount, currency) = intents
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::PaymentGateway(format!("No such payment_intent: {}", id)))?;
        Ok(PaymentIntentStatus {
            id: id.to_string(),
            status: status.to_string(),
            amount,
            currency,
        })
    });
    gateway
}

/// Returns the queued numbers in order, then keeps repeating the last one.
pub struct ScriptedOrderNumbers {
    numbers: Vec<String>,
    next: AtomicUsize,
}

impl ScriptedOrderNumbers {
    pub fn new(numbers: &[&str]) -> Self {
        Self {
            numbers: numbers.iter().map(|n| n.to_string()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

impl OrderNumberGenerator for ScriptedOrderNumbers {
    fn generate(&self, _now: DateTime<Utc>) -> String {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.numbers[index.min(self.numbers.len() - 1)].clone()
    }
}

/// Records every event it sees.
#[derive(Default)]
pub struct RecordingSink {
    pub seen: Mutex<Vec<events::Event>>,
}

#[async_trait]
impl EventHandler for RecordingSink {
    async fn handle_event(&self, event: &events::Event) -> Result<(), String> {
        self.seen
            .lock()
            .map_err(|e| e.to_string())?
            .push(event.clone());
        Ok(())
    }
}

/// Sink that fails on every event.
pub struct FailingSink;

#[async_trait]
impl EventHandler for FailingSink {
    async fn handle_event(&self, _event: &events::Event) -> Result<(), String> {
        Err("analytics store unavailable".to_string())
    }
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig::new(
        database_url,
        TEST_JWT_SECRET.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    )
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    payments: Arc<dyn PaymentGateway>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: Option<TempDir>,
}

impl TestApp {
    /// Construct a new test application whose card payments always succeed.
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(gateway_reporting("succeeded"))).await
    }

    pub async fn with_gateway(payments: Arc<dyn PaymentGateway>) -> Self {
        let mut cfg = test_config("sqlite::memory:".to_string());
        // A single connection keeps one in-memory database for the whole test
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        Self::build(cfg, payments, None).await
    }

    /// A file-backed database behind a pool of `connections`, so concurrent
    /// transactions really run side by side.
    pub async fn with_connections(connections: u32) -> Self {
        let dir = TempDir::new().expect("temp dir for database");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront.db").display()
        );
        let mut cfg = test_config(url);
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        Self::build(cfg, Arc::new(gateway_reporting("succeeded")), Some(dir)).await
    }

    async fn build(
        cfg: AppConfig,
        payments: Arc<dyn PaymentGateway>,
        db_dir: Option<TempDir>,
    ) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            payments.clone(),
            CheckoutOptions::from(&cfg),
        );
        let sinks: Vec<Arc<dyn EventHandler>> = vec![services.analytics.clone()];
        let event_task = tokio::spawn(events::process_events(event_rx, sinks));

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(axum::middleware::from_fn(
                storefront_api::telemetry::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            payments,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub fn db(&self) -> Arc<DatabaseConnection> {
        self.state.db.clone()
    }

    /// A checkout service over the same database with its own event channel and sinks.
    pub fn checkout_with(
        &self,
        sinks: Vec<Arc<dyn EventHandler>>,
        order_numbers: Option<Arc<dyn OrderNumberGenerator>>,
    ) -> CheckoutService {
        let (event_tx, event_rx) = mpsc::channel(2048);
        tokio::spawn(events::process_events(event_rx, sinks));

        let settings: Arc<dyn SettingsProvider> = self.state.services.settings.clone();
        let checkout = CheckoutService::new(
            self.db(),
            Arc::new(EventSender::new(event_tx)),
            settings,
            self.payments.clone(),
        );
        match order_numbers {
            Some(generator) => checkout.with_order_numbers(generator),
            None => checkout,
        }
    }

    /// Creates a payment intent for the user's current cart and returns its id.
    pub async fn pay_for_cart(&self, user_id: i32) -> String {
        self.state
            .services
            .checkout
            .create_payment_intent(user_id)
            .await
            .expect("create payment intent")
            .payment_intent_id
    }

    pub fn token_for(&self, user_id: i32, role: &str) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
            iss: None,
        };
        issue_token(&claims, TEST_JWT_SECRET).expect("encode access token")
    }

    pub fn user_token(&self, user_id: i32) -> String {
        self.token_for(user_id, USER_ROLE)
    }

    pub fn admin_token(&self) -> String {
        self.token_for(1, ADMIN_ROLE)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn set_pricing(&self, tax_rate_percent: Decimal, shipping_fee: Decimal) {
        self.settings()
            .update(UpdateSettingsInput {
                tax_rate_percent,
                shipping_fee,
            })
            .await
            .expect("update store settings");
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        self.state.services.settings.clone()
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variation(
        &self,
        product_id: i32,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> product_variation::Model {
        product_variation::ActiveModel {
            product_id: Set(product_id),
            name: Set(name.to_string()),
            price: Set(price),
            stock: Set(stock),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed variation")
    }

    pub async fn add_to_cart(
        &self,
        user_id: i32,
        product_id: i32,
        variation_id: Option<i32>,
        quantity: i32,
    ) -> cart_item::Model {
        self.state
            .services
            .cart
            .add_line(
                user_id,
                AddCartLineInput {
                    product_id,
                    variation_id,
                    quantity,
                },
            )
            .await
            .expect("add cart line")
    }

    pub async fn product_stock(&self, product_id: i32) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
            .stock
    }

    pub async fn variation_stock(&self, variation_id: i32) -> i32 {
        product_variation::Entity::find_by_id(variation_id)
            .one(&*self.state.db)
            .await
            .expect("load variation")
            .expect("variation exists")
            .stock
    }

    pub async fn cart_len(&self, user_id: i32) -> usize {
        self.state
            .services
            .cart
            .get_lines(user_id)
            .await
            .expect("load cart")
            .len()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized as a JSON string or number.
pub fn json_decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}
