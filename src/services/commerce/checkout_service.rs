use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        cart_item,
        order::{self, OrderStatus},
        product, product_variation,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        commerce::{
            cart_service::CartService,
            pricing_service::{quote_lines, Quote},
        },
        order_number::{OrderNumberGenerator, RandomOrderNumbers},
        orders::{NewOrder, OrderDetails, OrderLedger},
        payments::PaymentGateway,
        settings::SettingsProvider,
    },
};

/// Payment method that must be backed by a settled payment intent.
pub const CARD_PAYMENT_METHOD: &str = "card";

/// Reported when a settled intent was created for a different total.
pub const PAYMENT_AMOUNT_MISMATCH: &str = "amount_mismatch";
/// Reported when a settled intent already paid for another order.
pub const PAYMENT_ALREADY_USED: &str = "already_used";

/// Name of the unique index that lets an intent pay for one order only.
const PAYMENT_INTENT_INDEX_COLUMN: &str = "payment_intent_id";

/// Checkout request body. camelCase field names are accepted as well.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderInput {
    #[serde(alias = "shippingAddress")]
    #[validate(length(min = 1, max = 2000))]
    pub shipping_address: String,
    #[serde(alias = "paymentMethod")]
    #[validate(length(min = 1, max = 50))]
    pub payment_method: String,
    #[serde(default, alias = "paymentIntentId")]
    pub payment_intent_id: Option<String>,
}

/// Client secret for the front end plus the quote it was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaymentIntentQuote {
    pub client_secret: String,
    pub payment_intent_id: String,
    #[serde(flatten)]
    pub quote: Quote,
}

/// Tunables for the checkout flow
#[derive(Debug, Clone)]
pub struct CheckoutOptions {
    pub currency: String,
    pub gateway_timeout: Duration,
    pub order_number_attempts: u32,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            gateway_timeout: Duration::from_secs(10),
            order_number_attempts: 3,
        }
    }
}

impl From<&AppConfig> for CheckoutOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.payment_currency.to_lowercase(),
            gateway_timeout: cfg.payment_timeout(),
            order_number_attempts: cfg.order_number_max_attempts,
        }
    }
}

/// Turns a user's cart into an order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    carts: CartService,
    orders: OrderLedger,
    settings: Arc<dyn SettingsProvider>,
    payments: Arc<dyn PaymentGateway>,
    order_numbers: Arc<dyn OrderNumberGenerator>,
    options: CheckoutOptions,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        settings: Arc<dyn SettingsProvider>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            carts: CartService::new(db.clone()),
            orders: OrderLedger::new(db.clone()),
            db,
            event_sender,
            settings,
            payments,
            order_numbers: Arc::new(RandomOrderNumbers),
            options: CheckoutOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CheckoutOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_order_numbers(mut self, order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        self.order_numbers = order_numbers;
        self
    }

    /// Prices the user's cart. Read-only.
    #[instrument(skip(self))]
    pub async fn quote_cart(&self, user_id: i32) -> Result<Quote, ServiceError> {
        let lines = self.carts.get_lines(user_id).await?;
        self.quote(&lines).await
    }

    /// Creates a payment intent for the cart total.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        user_id: i32,
    ) -> Result<PaymentIntentQuote, ServiceError> {
        let quote = self.quote_cart(user_id).await?;
        let intent = self
            .call_gateway(
                self.payments
                    .create_intent(quote.total, &self.options.currency),
            )
            .await?;

        info!(user_id, intent_id = %intent.id, total = %quote.total, "Payment intent created for cart");
        Ok(PaymentIntentQuote {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
            quote,
        })
    }

    /// Places an order for everything in the user's cart.
    ///
    /// Card payments are verified with the gateway before anything is written.
    /// The intent must have settled for exactly this cart's total, and an
    /// intent pays for one order only.
    /// Stock decrements, the order, its items and the cart cleanup then commit
    /// in one transaction. Analytics are notified after commit.
    #[instrument(skip(self, input), fields(payment_method = %input.payment_method))]
    pub async fn place_order(
        &self,
        user_id: i32,
        input: PlaceOrderInput,
    ) -> Result<OrderDetails, ServiceError> {
        input.validate()?;
        if input.shipping_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "shipping_address must not be blank".to_string(),
            ));
        }

        let lines = self.carts.get_lines(user_id).await?;
        let quote = self.quote(&lines).await?;

        let payment_method = input.payment_method.trim().to_lowercase();
        let mut payment_intent_id = None;
        let status = if payment_method == CARD_PAYMENT_METHOD {
            let intent_id = input
                .payment_intent_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or(ServiceError::MissingPaymentReference)?;

            let intent = self
                .call_gateway(self.payments.retrieve_intent(intent_id))
                .await?;
            if !intent.is_succeeded() {
                warn!(user_id, intent_id, status = %intent.status, "Rejecting checkout with unsettled payment");
                counter!("storefront_checkout_rejected_total", 1, "reason" => "payment_not_confirmed");
                return Err(ServiceError::PaymentNotConfirmed(intent.status));
            }
            if !intent.covers(quote.total, &self.options.currency)? {
                warn!(
                    user_id,
                    intent_id,
                    intent_amount = intent.amount,
                    total = %quote.total,
                    "Rejecting checkout paid for a different amount"
                );
                counter!("storefront_checkout_rejected_total", 1, "reason" => "payment_amount_mismatch");
                return Err(ServiceError::PaymentNotConfirmed(
                    PAYMENT_AMOUNT_MISMATCH.to_string(),
                ));
            }
            payment_intent_id = Some(intent_id.to_string());
            OrderStatus::Processing
        } else {
            OrderStatus::Pending
        };

        let draft = NewOrder {
            user_id,
            quote,
            status,
            shipping_address: input.shipping_address.trim().to_string(),
            payment_method,
            payment_intent_id,
        };

        let txn = self.db.begin().await?;
        let placed = match self.persist_order(&txn, &draft, &lines).await {
            Ok(details) => details,
            Err(err) => {
                if matches!(err, ServiceError::InsufficientStock(_)) {
                    counter!("storefront_checkout_rejected_total", 1, "reason" => "insufficient_stock");
                }
                return Err(rollback_with(txn, err).await);
            }
        };
        txn.commit().await?;

        info!(
            order_id = placed.id,
            order_number = %placed.order_number,
            user_id,
            total = %placed.total,
            "Order placed"
        );
        counter!("storefront_orders_placed_total", 1);

        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: placed.id,
            order_number: placed.order_number.clone(),
            user_id,
            total: placed.total,
            at: placed.created_at,
        });

        Ok(placed)
    }

    /// Admin status change. Any status may follow any other.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        let (previous, details) = self.orders.update_status(order_id, status).await?;

        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status: previous,
            new_status: status,
            at: details.updated_at,
        });
        Ok(details)
    }

    /// Public lookup by order number; surrounding whitespace is ignored.
    #[instrument(skip(self))]
    pub async fn track_order(&self, order_number: &str) -> Result<OrderDetails, ServiceError> {
        let order_number = order_number.trim();
        if order_number.is_empty() {
            return Err(ServiceError::OrderNotFound(String::new()));
        }
        self.orders.find_by_order_number(order_number).await
    }

    /// Admin removal of an order and its items.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: i32) -> Result<(), ServiceError> {
        self.orders.delete(order_id).await?;
        self.event_sender.send_or_log(Event::OrderDeleted {
            order_id,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn quote(&self, lines: &[cart_item::Model]) -> Result<Quote, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let settings = self.settings.current().await?;
        quote_lines(lines, &settings)
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::time::timeout(self.options.gateway_timeout, call)
            .await
            .map_err(|_| {
                counter!("storefront_payment_gateway_timeouts_total", 1);
                ServiceError::PaymentGateway(format!(
                    "no response within {:?}",
                    self.options.gateway_timeout
                ))
            })?
    }

    async fn persist_order(
        &self,
        txn: &DatabaseTransaction,
        draft: &NewOrder,
        lines: &[cart_item::Model],
    ) -> Result<OrderDetails, ServiceError> {
        // Fixed lock order keeps concurrent checkouts from deadlocking.
        let mut by_stock_row: Vec<&cart_item::Model> = lines.iter().collect();
        by_stock_row.sort_by_key(|line| (line.product_id, line.variation_id));
        for line in by_stock_row {
            Self::decrement_stock(txn, line).await?;
        }

        let header = self.insert_header_with_retry(txn, draft).await?;
        OrderLedger::insert_items(txn, header.id, lines).await?;

        // Only the lines that were priced are consumed. Fewer rows means a
        // concurrent checkout already took them.
        let line_ids = lines.iter().map(|line| line.id).collect();
        let removed = CartService::remove_lines_in(txn, draft.user_id, line_ids).await?;
        if removed != lines.len() as u64 {
            warn!(
                user_id = draft.user_id,
                expected = lines.len(),
                removed,
                "Cart changed during checkout"
            );
            return Err(ServiceError::EmptyCart);
        }

        OrderLedger::details_in(txn, header).await
    }

    /// `stock = stock - qty` guarded by `stock >= qty`, so stock never goes negative.
    async fn decrement_stock(
        txn: &DatabaseTransaction,
        line: &cart_item::Model,
    ) -> Result<(), ServiceError> {
        let updated = match line.variation_id {
            Some(variation_id) => {
                product_variation::Entity::update_many()
                    .col_expr(
                        product_variation::Column::Stock,
                        Expr::col(product_variation::Column::Stock).sub(line.quantity),
                    )
                    .filter(product_variation::Column::Id.eq(variation_id))
                    .filter(product_variation::Column::Stock.gte(line.quantity))
                    .exec(txn)
                    .await?
            }
            None => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).sub(line.quantity),
                    )
                    .filter(product::Column::Id.eq(line.product_id))
                    .filter(product::Column::Stock.gte(line.quantity))
                    .exec(txn)
                    .await?
            }
        };

        if updated.rows_affected == 1 {
            return Ok(());
        }

        let product = product::Entity::find_by_id(line.product_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::ProductNotFound(line.product_id.to_string()))?;
        let name = match line.variation_id {
            Some(variation_id) => {
                let variation = product_variation::Entity::find_by_id(variation_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::ProductNotFound(format!("variation {}", variation_id))
                    })?;
                format!("{} ({})", product.name, variation.name)
            }
            None => product.name,
        };

        warn!(product = %name, requested = line.quantity, "Insufficient stock");
        Err(ServiceError::InsufficientStock(name))
    }

    /// Inserts the header under a fresh order number, regenerating on collision.
    /// Each attempt runs in a savepoint so a failed insert leaves `txn` usable.
    async fn insert_header_with_retry(
        &self,
        txn: &DatabaseTransaction,
        draft: &NewOrder,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let max_attempts = self.options.order_number_attempts.max(1);
        let mut attempt = 1;

        loop {
            let order_number = self.order_numbers.generate(now);
            let savepoint = txn.begin().await?;

            let err = match OrderLedger::insert_header(&savepoint, draft, &order_number, now).await {
                Ok(header) => {
                    savepoint.commit().await?;
                    return Ok(header);
                }
                Err(err) => err,
            };

            let unique_violation = match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(detail)) => Some(detail),
                _ => None,
            };
            let failure = match unique_violation {
                Some(detail) if detail.contains(PAYMENT_INTENT_INDEX_COLUMN) => {
                    warn!(
                        payment_intent_id = ?draft.payment_intent_id,
                        "Payment intent already paid for another order"
                    );
                    counter!("storefront_checkout_rejected_total", 1, "reason" => "payment_already_used");
                    ServiceError::PaymentNotConfirmed(PAYMENT_ALREADY_USED.to_string())
                }
                Some(_) if attempt < max_attempts => {
                    savepoint.rollback().await?;
                    warn!(%order_number, attempt, "Order number collision, regenerating");
                    counter!("storefront_order_number_collisions_total", 1);
                    attempt += 1;
                    continue;
                }
                Some(_) => {
                    error!(attempts = attempt, "No unique order number could be allocated");
                    ServiceError::InternalError(format!(
                        "no unique order number after {} attempts",
                        attempt
                    ))
                }
                None => ServiceError::DatabaseError(err),
            };
            return Err(rollback_with(savepoint, failure).await);
        }
    }
}

/// Rolls `txn` back and hands back `err`. A failed rollback is logged, the
/// original error still wins.
async fn rollback_with(txn: DatabaseTransaction, err: ServiceError) -> ServiceError {
    if let Err(rollback_err) = txn.rollback().await {
        error!(error = %rollback_err, cause = %err, "Rollback failed");
    }
    err
}
