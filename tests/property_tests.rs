//! Property-based tests for checkout pricing and order numbers.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::{
    entities::cart_item,
    services::{
        commerce::pricing_service::{quote_lines, round2},
        order_number::{OrderNumberGenerator, RandomOrderNumbers},
        settings::PricingSettings,
    },
};

// Strategies for generating test data
fn cents_strategy(max: i64) -> impl Strategy<Value = Decimal> {
    (0i64..max).prop_map(|cents| Decimal::new(cents, 2))
}

fn line_strategy() -> impl Strategy<Value = (Decimal, i32)> {
    (cents_strategy(100_000), 1i32..50)
}

fn lines(raw: &[(Decimal, i32)]) -> Vec<cart_item::Model> {
    raw.iter()
        .enumerate()
        .map(|(i, (unit_price, quantity))| cart_item::Model {
            id: i as i32 + 1,
            user_id: 1,
            product_id: i as i32 + 1,
            variation_id: None,
            quantity: *quantity,
            unit_price: *unit_price,
            created_at: Utc::now(),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn total_is_the_sum_of_its_parts(
        raw in prop::collection::vec(line_strategy(), 1..8),
        rate in cents_strategy(3_000),
        shipping in cents_strategy(5_000),
    ) {
        let settings = PricingSettings { tax_rate_percent: rate, shipping_fee: shipping };
        let quote = quote_lines(&lines(&raw), &settings).unwrap();

        let expected_subtotal: Decimal = raw.iter().map(|(p, q)| *p * Decimal::from(*q)).sum();
        prop_assert_eq!(quote.subtotal, expected_subtotal);
        prop_assert_eq!(quote.shipping_fee, shipping);
        prop_assert_eq!(quote.total, round2(quote.subtotal + quote.shipping_fee + quote.tax));
    }

    #[test]
    fn tax_is_non_negative_and_cent_precise(
        raw in prop::collection::vec(line_strategy(), 1..8),
        rate in cents_strategy(3_000),
    ) {
        let settings = PricingSettings { tax_rate_percent: rate, shipping_fee: Decimal::ZERO };
        let quote = quote_lines(&lines(&raw), &settings).unwrap();

        prop_assert!(quote.tax >= Decimal::ZERO);
        prop_assert_eq!(quote.tax, round2(quote.tax));
        // Rounding moves tax by at most half a cent
        let exact = quote.subtotal * rate / Decimal::ONE_HUNDRED;
        prop_assert!((quote.tax - exact).abs() <= Decimal::new(5, 3));
    }

    #[test]
    fn order_numbers_carry_the_date(day in 1u32..28, month in 1u32..12) {
        let now = Utc.with_ymd_and_hms(2024, month, day, 9, 30, 0).unwrap();
        let number = RandomOrderNumbers.generate(now);

        let expected_prefix = format!("ORD-2024{:02}{:02}-", month, day);
        prop_assert!(number.starts_with(&expected_prefix));
        prop_assert_eq!(number.len(), 17);
    }
}
