use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, SqlErr};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{entities::store_settings, errors::ServiceError};

/// The settings table holds exactly one row with this id.
const SETTINGS_ROW_ID: i32 = 1;

/// Checkout pricing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingSettings {
    #[schema(value_type = String, example = "10")]
    pub tax_rate_percent: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub shipping_fee: Decimal,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            tax_rate_percent: Decimal::ZERO,
            shipping_fee: Decimal::ZERO,
        }
    }
}

impl From<store_settings::Model> for PricingSettings {
    fn from(model: store_settings::Model) -> Self {
        Self {
            tax_rate_percent: model.tax_rate_percent,
            shipping_fee: model.shipping_fee,
        }
    }
}

/// Source of the rates applied at checkout.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn current(&self) -> Result<PricingSettings, ServiceError>;
}

/// Fixed rates, for embedding and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSettings(pub PricingSettings);

#[async_trait]
impl SettingsProvider for FixedSettings {
    async fn current(&self) -> Result<PricingSettings, ServiceError> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateSettingsInput {
    #[validate(custom = "validate_non_negative")]
    #[schema(value_type = String, example = "8.25")]
    pub tax_rate_percent: Decimal,
    #[validate(custom = "validate_non_negative")]
    #[schema(value_type = String, example = "4.99")]
    pub shipping_fee: Decimal,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Must be zero or greater".into());
        return Err(err);
    }
    Ok(())
}

/// Database-backed settings singleton.
#[derive(Clone)]
pub struct SettingsService {
    db: Arc<DatabaseConnection>,
}

impl SettingsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Returns the stored settings, creating the zero-rate row on first access.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<PricingSettings, ServiceError> {
        if let Some(row) = store_settings::Entity::find_by_id(SETTINGS_ROW_ID)
            .one(&*self.db)
            .await?
        {
            return Ok(row.into());
        }

        let defaults = PricingSettings::default();
        let row = store_settings::ActiveModel {
            id: Set(SETTINGS_ROW_ID),
            tax_rate_percent: Set(defaults.tax_rate_percent),
            shipping_fee: Set(defaults.shipping_fee),
            updated_at: Set(Utc::now()),
        };

        match row.insert(&*self.db).await {
            Ok(model) => {
                info!("Created default store settings");
                Ok(model.into())
            }
            // Another request created the row first.
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                store_settings::Entity::find_by_id(SETTINGS_ROW_ID)
                    .one(&*self.db)
                    .await?
                    .map(PricingSettings::from)
                    .ok_or_else(|| {
                        ServiceError::database_error_message("store settings row vanished")
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the tax rate and shipping fee.
    #[instrument(skip(self))]
    pub async fn update(&self, input: UpdateSettingsInput) -> Result<PricingSettings, ServiceError> {
        input.validate()?;
        // make sure the row exists
        self.get().await?;

        let row = store_settings::ActiveModel {
            id: Set(SETTINGS_ROW_ID),
            tax_rate_percent: Set(input.tax_rate_percent),
            shipping_fee: Set(input.shipping_fee),
            updated_at: Set(Utc::now()),
        };
        let updated = row.update(&*self.db).await?;

        info!(
            tax_rate_percent = %updated.tax_rate_percent,
            shipping_fee = %updated.shipping_fee,
            "Store settings updated"
        );
        Ok(updated.into())
    }
}

#[async_trait]
impl SettingsProvider for SettingsService {
    async fn current(&self) -> Result<PricingSettings, ServiceError> {
        self.get().await
    }
}
