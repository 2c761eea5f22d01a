use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    entities::{
        cart_item,
        order::{self, OrderStatus},
        order_item, product, product_variation,
    },
    errors::ServiceError,
    services::{commerce::pricing_service::Quote, order_status::check_transition},
};

/// Order line as returned to clients, with display names of what was bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderItemView {
    pub id: i32,
    pub product_id: i32,
    pub product_name: Option<String>,
    pub variation_id: Option<i32>,
    pub variation_name: Option<String>,
    pub quantity: i32,
    #[schema(value_type = String, example = "25.00")]
    pub unit_price: Decimal,
}

/// An order with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderDetails {
    pub id: i32,
    pub order_number: String,
    pub user_id: i32,
    #[schema(value_type = String, example = "50.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub shipping_fee: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "60.00")]
    pub total: Decimal,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemView>,
}

impl OrderDetails {
    fn assemble(order: order::Model, items: Vec<OrderItemView>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            tax: order.tax,
            total: order.total,
            status: order.status,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            payment_intent_id: order.payment_intent_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items,
        }
    }
}

/// Header fields of an order about to be written.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i32,
    pub quote: Quote,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub payment_method: String,
    pub payment_intent_id: Option<String>,
}

/// Persistence and lookup of orders and their items.
#[derive(Clone)]
pub struct OrderLedger {
    db: Arc<DatabaseConnection>,
}

impl OrderLedger {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up an order; with `owner` set, orders of other users are reported as missing.
    #[instrument(skip(self))]
    pub async fn find_by_id(
        &self,
        id: i32,
        owner: Option<i32>,
    ) -> Result<OrderDetails, ServiceError> {
        let mut query = order::Entity::find_by_id(id);
        if let Some(user_id) = owner {
            query = query.filter(order::Column::UserId.eq(user_id));
        }

        let order = query
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;
        self.single(order).await
    }

    #[instrument(skip(self))]
    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_number.to_string()))?;
        self.single(order).await
    }

    /// The user's orders, newest first.
    #[instrument(skip(self))]
    pub async fn find_all_for_user(&self, user_id: i32) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        Self::hydrate(&*self.db, orders).await
    }

    /// Every order, newest first.
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        Self::hydrate(&*self.db, orders).await
    }

    /// Writes an order header. Errors are returned raw so callers can react to
    /// a duplicate order number or an already used payment intent.
    pub async fn insert_header<C: ConnectionTrait>(
        conn: &C,
        draft: &NewOrder,
        order_number: &str,
        now: DateTime<Utc>,
    ) -> Result<order::Model, DbErr> {
        order::ActiveModel {
            order_number: Set(order_number.to_string()),
            user_id: Set(draft.user_id),
            subtotal: Set(draft.quote.subtotal),
            shipping_fee: Set(draft.quote.shipping_fee),
            tax: Set(draft.quote.tax),
            total: Set(draft.quote.total),
            status: Set(draft.status),
            shipping_address: Set(draft.shipping_address.clone()),
            payment_method: Set(draft.payment_method.clone()),
            payment_intent_id: Set(draft.payment_intent_id.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    /// Writes one order item per cart line, copying the line's unit price.
    pub async fn insert_items<C: ConnectionTrait>(
        conn: &C,
        order_id: i32,
        lines: &[cart_item::Model],
    ) -> Result<(), ServiceError> {
        let items = lines.iter().map(|line| order_item::ActiveModel {
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            variation_id: Set(line.variation_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            ..Default::default()
        });
        order_item::Entity::insert_many(items)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    /// Loads the items of a freshly written order through `conn`.
    pub async fn details_in<C: ConnectionTrait>(
        conn: &C,
        order: order::Model,
    ) -> Result<OrderDetails, ServiceError> {
        let mut hydrated = Self::hydrate(conn, vec![order]).await?;
        hydrated
            .pop()
            .ok_or_else(|| ServiceError::InternalError("order vanished while loading".to_string()))
    }

    /// Sets a new status and returns the previous one with the updated order.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: i32,
        status: OrderStatus,
    ) -> Result<(OrderStatus, OrderDetails), ServiceError> {
        let txn = self.db.begin().await?;

        let order = order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(id.to_string()))?;
        let previous = order.status;
        check_transition(previous, status)?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        let details = Self::details_in(&txn, updated).await?;
        txn.commit().await?;

        info!(order_id = id, from = %previous, to = %status, "Order status updated");
        Ok((previous, details))
    }

    /// Removes an order and its items.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.eq(id))
            .exec(&txn)
            .await?;
        let result = order::Entity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::OrderNotFound(id.to_string()));
        }

        txn.commit().await?;
        info!(order_id = id, "Order deleted");
        Ok(())
    }

    async fn single(&self, order: order::Model) -> Result<OrderDetails, ServiceError> {
        Self::details_in(&*self.db, order).await
    }

    /// Attaches items and product/variation names, keeping the order of `orders`.
    async fn hydrate<C: ConnectionTrait>(
        conn: &C,
        orders: Vec<order::Model>,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .order_by_asc(order_item::Column::Id)
            .all(conn)
            .await?;

        let mut product_ids: Vec<i32> = items.iter().map(|i| i.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let product_names: HashMap<i32, String> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();

        let mut variation_ids: Vec<i32> = items.iter().filter_map(|i| i.variation_id).collect();
        variation_ids.sort_unstable();
        variation_ids.dedup();
        let variation_names: HashMap<i32, String> = if variation_ids.is_empty() {
            HashMap::new()
        } else {
            product_variation::Entity::find()
                .filter(product_variation::Column::Id.is_in(variation_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|v| (v.id, v.name))
                .collect()
        };

        let mut by_order: HashMap<i32, Vec<OrderItemView>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(OrderItemView {
                id: item.id,
                product_id: item.product_id,
                product_name: product_names.get(&item.product_id).cloned(),
                variation_id: item.variation_id,
                variation_name: item
                    .variation_id
                    .and_then(|id| variation_names.get(&id).cloned()),
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderDetails::assemble(order, items)
            })
            .collect())
    }
}
