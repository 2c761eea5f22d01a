use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::{cart_item, product, product_variation},
    errors::ServiceError,
};

/// Input for adding a product (or one of its variations) to a cart
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddCartLineInput {
    pub product_id: i32,
    pub variation_id: Option<i32>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

/// Per-user cart lines with prices resolved at add time.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All lines in the user's cart, oldest first.
    pub async fn get_lines(&self, user_id: i32) -> Result<Vec<cart_item::Model>, ServiceError> {
        Self::get_lines_in(&*self.db, user_id).await
    }

    pub async fn get_lines_in<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::Id)
            .all(conn)
            .await?)
    }

    /// Empties the user's cart.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: i32) -> Result<(), ServiceError> {
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Deletes the given lines of one user, returning how many were removed.
    pub async fn remove_lines_in<C: ConnectionTrait>(
        conn: &C,
        user_id: i32,
        line_ids: Vec<i32>,
    ) -> Result<u64, ServiceError> {
        let result = cart_item::Entity::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::Id.is_in(line_ids))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Adds a line, or increments the quantity of the matching line.
    ///
    /// The unit price is the variation price when a variation is given, else the
    /// product price. An existing line keeps the price it was first added at.
    #[instrument(skip(self))]
    pub async fn add_line(
        &self,
        user_id: i32,
        input: AddCartLineInput,
    ) -> Result<cart_item::Model, ServiceError> {
        input.validate()?;

        match self.upsert_line(user_id, &input).await {
            // A concurrent add inserted the same line first; it now exists to increment.
            Err(ServiceError::DatabaseError(err))
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                debug!(user_id, product_id = input.product_id, "Cart line created concurrently, incrementing");
                self.upsert_line(user_id, &input).await
            }
            other => other,
        }
    }

    async fn upsert_line(
        &self,
        user_id: i32,
        input: &AddCartLineInput,
    ) -> Result<cart_item::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let product = product::Entity::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ProductNotFound(input.product_id.to_string()))?;

        let unit_price = match input.variation_id {
            Some(variation_id) => {
                product_variation::Entity::find_by_id(variation_id)
                    .filter(product_variation::Column::ProductId.eq(product.id))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::ProductNotFound(format!(
                            "variation {} of product {}",
                            variation_id, product.id
                        ))
                    })?
                    .price
            }
            None => product.price,
        };

        let mut existing = cart_item::Entity::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product.id));
        existing = match input.variation_id {
            Some(variation_id) => existing.filter(cart_item::Column::VariationId.eq(variation_id)),
            None => existing.filter(cart_item::Column::VariationId.is_null()),
        };

        let line = match existing.one(&txn).await? {
            Some(line) => {
                if line.quantity.checked_add(input.quantity).is_none() {
                    return Err(ServiceError::ValidationError(
                        "Cart quantity is too large".to_string(),
                    ));
                }
                // Incremented in place so concurrent adds never lose a quantity.
                cart_item::Entity::update_many()
                    .col_expr(
                        cart_item::Column::Quantity,
                        Expr::col(cart_item::Column::Quantity).add(input.quantity),
                    )
                    .filter(cart_item::Column::Id.eq(line.id))
                    .exec(&txn)
                    .await?;
                cart_item::Entity::find_by_id(line.id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Cart line {} not found", line.id)))?
            }
            None => {
                cart_item::ActiveModel {
                    user_id: Set(user_id),
                    product_id: Set(product.id),
                    variation_id: Set(input.variation_id),
                    quantity: Set(input.quantity),
                    unit_price: Set(unit_price),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;

        info!(
            user_id,
            product_id = line.product_id,
            quantity = line.quantity,
            "Cart line saved"
        );
        Ok(line)
    }

    /// Removes one of the user's lines.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, user_id: i32, line_id: i32) -> Result<(), ServiceError> {
        let removed = Self::remove_lines_in(&*self.db, user_id, vec![line_id]).await?;
        if removed == 0 {
            return Err(ServiceError::NotFound(format!("Cart line {} not found", line_id)));
        }
        Ok(())
    }
}
