use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{entities::cart_item, errors::ServiceError, services::settings::PricingSettings};

/// Rounds a monetary amount to cents, halves away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Price breakdown of a cart at the current settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    #[schema(value_type = String, example = "50.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub shipping_fee: Decimal,
    #[schema(value_type = String, example = "60.00")]
    pub total: Decimal,
}

/// Prices cart lines using their snapshot unit prices.
///
/// `tax = round2(subtotal * rate / 100)` and `total = round2(subtotal + shipping + tax)`.
pub fn quote_lines(
    lines: &[cart_item::Model],
    settings: &PricingSettings,
) -> Result<Quote, ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let out_of_range = || ServiceError::ValidationError("Cart total is out of range".to_string());

    let subtotal = lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        line.unit_price
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|line_total| acc.checked_add(line_total))
            .ok_or_else(out_of_range)
    })?;

    let tax = subtotal
        .checked_mul(settings.tax_rate_percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round2)
        .ok_or_else(out_of_range)?;

    let total = subtotal
        .checked_add(settings.shipping_fee)
        .and_then(|v| v.checked_add(tax))
        .map(round2)
        .ok_or_else(out_of_range)?;

    Ok(Quote {
        subtotal,
        tax,
        shipping_fee: settings.shipping_fee,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn line(product_id: i32, quantity: i32, unit_price: Decimal) -> cart_item::Model {
        cart_item::Model {
            id: product_id,
            user_id: 1,
            product_id,
            variation_id: None,
            quantity,
            unit_price,
            created_at: Utc::now(),
        }
    }

    fn settings(tax_rate_percent: Decimal, shipping_fee: Decimal) -> PricingSettings {
        PricingSettings {
            tax_rate_percent,
            shipping_fee,
        }
    }

    #[test]
    fn quotes_single_line_cart() {
        let quote = quote_lines(
            &[line(7, 2, dec!(25.00))],
            &settings(dec!(10), dec!(5.00)),
        )
        .unwrap();

        assert_eq!(quote.subtotal, dec!(50.00));
        assert_eq!(quote.tax, dec!(5.00));
        assert_eq!(quote.shipping_fee, dec!(5.00));
        assert_eq!(quote.total, dec!(60.00));
    }

    #[test]
    fn sums_every_line() {
        let quote = quote_lines(
            &[line(1, 3, dec!(1.99)), line(2, 1, dec!(10.50))],
            &settings(dec!(0), dec!(0)),
        )
        .unwrap();

        assert_eq!(quote.subtotal, dec!(16.47));
        assert_eq!(quote.total, dec!(16.47));
    }

    #[rstest]
    #[case(dec!(0.05), dec!(10), dec!(0.01))]
    #[case(dec!(0.15), dec!(10), dec!(0.02))]
    #[case(dec!(0.25), dec!(10), dec!(0.03))]
    #[case(dec!(19.99), dec!(8.25), dec!(1.65))]
    fn tax_rounds_half_away_from_zero(
        #[case] price: Decimal,
        #[case] rate: Decimal,
        #[case] expected_tax: Decimal,
    ) {
        let quote = quote_lines(&[line(1, 1, price)], &settings(rate, dec!(0))).unwrap();
        assert_eq!(quote.tax, expected_tax);
    }

    #[test]
    fn empty_cart_is_rejected() {
        let result = quote_lines(&[], &settings(dec!(10), dec!(5)));
        assert!(matches!(result, Err(ServiceError::EmptyCart)));
    }
}
