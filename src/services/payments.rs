//! Card payment provider adapter.
//!
//! The checkout flow only needs two calls: create an intent for an amount, and
//! look up whether an intent has settled. Amounts cross this boundary in major
//! units and are converted to the provider's minor units here.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::errors::ServiceError;

/// Settlement state reported by the provider for a confirmed payment.
pub const INTENT_SUCCEEDED: &str = "succeeded";

const INTENT_ID_PREFIX: &str = "pi_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntentStatus {
    pub id: String,
    pub status: String,
    /// Amount the intent was created for, in minor units
    pub amount: i64,
    pub currency: String,
}

impl PaymentIntentStatus {
    pub fn is_succeeded(&self) -> bool {
        self.status == INTENT_SUCCEEDED
    }

    /// True when the intent was created for exactly `amount` in `currency`.
    pub fn covers(&self, amount: Decimal, currency: &str) -> Result<bool, ServiceError> {
        Ok(self.amount == to_minor_units(amount)? && self.currency.eq_ignore_ascii_case(currency))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an intent for `amount` (major units, e.g. dollars).
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntentStatus, ServiceError>;
}

/// Converts a major-unit amount to integer minor units (x100, half away from zero).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ValidationError(format!(
            "Payment amount must not be negative: {}",
            amount
        )));
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| {
            ServiceError::ValidationError(format!("Payment amount out of range: {}", amount))
        })
}

/// Rejects anything that is not a bare intent id, so client input can never
/// address another provider resource.
pub fn check_intent_id(intent_id: &str) -> Result<(), ServiceError> {
    let well_formed = intent_id
        .strip_prefix(INTENT_ID_PREFIX)
        .map(|rest| {
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .unwrap_or(false);
    if well_formed {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "Malformed payment intent id: {}",
            intent_id
        )))
    }
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe-compatible REST client.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    async fn read_intent(response: reqwest::Response) -> Result<IntentBody, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ProviderErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "no error detail".to_string());
            error!(%status, "Payment provider rejected request: {}", detail);
            return Err(ServiceError::PaymentGateway(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        response
            .json::<IntentBody>()
            .await
            .map_err(|e| ServiceError::PaymentGateway(format!("malformed provider response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let minor = to_minor_units(amount)?;
        let form = [
            ("amount", minor.to_string()),
            ("currency", currency.to_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentGateway(e.to_string()))?;

        let body = Self::read_intent(response).await?;
        let client_secret = body.client_secret.ok_or_else(|| {
            ServiceError::PaymentGateway("provider response lacks client_secret".to_string())
        })?;

        info!(intent_id = %body.id, amount_minor = minor, "Payment intent created");
        Ok(PaymentIntent {
            id: body.id,
            client_secret,
        })
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntentStatus, ServiceError> {
        check_intent_id(intent_id)?;

        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentGateway(e.to_string()))?;

        let body = Self::read_intent(response).await?;
        Ok(PaymentIntentStatus {
            id: body.id,
            status: body.status,
            amount: body.amount,
            currency: body.currency,
        })
    }
}

/// Stand-in used when no provider key is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_intent(
        &self,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        Err(ServiceError::PaymentGateway(
            "card payments are not configured".to_string(),
        ))
    }

    async fn retrieve_intent(&self, _intent_id: &str) -> Result<PaymentIntentStatus, ServiceError> {
        Err(ServiceError::PaymentGateway(
            "card payments are not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(60.00), 6000)]
    #[case(dec!(0.015), 2)]
    #[case(dec!(19.994), 1999)]
    #[case(dec!(0), 0)]
    fn converts_to_cents(#[case] amount: Decimal, #[case] expected: i64) {
        assert_eq!(to_minor_units(amount).unwrap(), expected);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(matches!(
            to_minor_units(dec!(-1.00)),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn unconfigured_gateway_reports_gateway_error() {
        let result = UnconfiguredGateway.retrieve_intent("pi_123").await;
        assert!(matches!(result, Err(ServiceError::PaymentGateway(_))));
    }

    #[rstest]
    #[case("pi_3MtwBwLkdIwHu7ix28a3tqPa")]
    #[case("pi_test_123")]
    fn accepts_intent_ids(#[case] id: &str) {
        assert!(check_intent_id(id).is_ok());
    }

    #[rstest]
    #[case("../charges/ch_3MtwBwLkdIwHu7ix")]
    #[case("pi_123/../../charges/ch_1")]
    #[case("pi_123?expand=charges")]
    #[case("pi_")]
    #[case("ch_3MtwBwLkdIwHu7ix")]
    #[case("")]
    fn rejects_ids_that_are_not_intents(#[case] id: &str) {
        assert!(matches!(
            check_intent_id(id),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn retrieve_refuses_malformed_ids_before_calling_out() {
        let gateway =
            StripeGateway::new("sk_test", "http://127.0.0.1:9", Duration::from_millis(50))
                .unwrap();
        let result = gateway.retrieve_intent("../charges/ch_1").await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn intent_covers_only_its_own_amount_and_currency() {
        let intent = PaymentIntentStatus {
            id: "pi_1".to_string(),
            status: INTENT_SUCCEEDED.to_string(),
            amount: 6000,
            currency: "usd".to_string(),
        };
        assert!(intent.covers(dec!(60.00), "USD").unwrap());
        assert!(!intent.covers(dec!(2065.00), "usd").unwrap());
        assert!(!intent.covers(dec!(60.00), "eur").unwrap());
    }

    #[test]
    fn trailing_slash_is_trimmed_from_api_base() {
        let gateway =
            StripeGateway::new("sk_test", "https://api.example.com/", Duration::from_secs(1))
                .unwrap();
        assert_eq!(gateway.api_base, "https://api.example.com");
    }
}
