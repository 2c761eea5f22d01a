//! Concurrent checkouts competing for the same stock or the same cart.
//!
//! These run against a file-backed database with several pooled connections,
//! so the competing transactions overlap instead of queueing for one
//! connection.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use futures::future::join_all;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront_api::{
    entities::order, errors::ServiceError, services::commerce::PlaceOrderInput,
};

fn cash_on_delivery() -> PlaceOrderInput {
    PlaceOrderInput {
        shipping_address: "1 Main St, Springfield".to_string(),
        payment_method: "cod".to_string(),
        payment_intent_id: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_is_sold_exactly_once() {
    let app = TestApp::with_connections(4).await;
    app.set_pricing(dec!(0), dec!(0)).await;
    let desk = app.seed_product("Walnut Desk", dec!(25.00), 1).await;
    app.add_to_cart(1, desk.id, None, 1).await;
    app.add_to_cart(2, desk.id, None, 1).await;

    let checkout = app.state.services.checkout.clone();
    let other = checkout.clone();
    let (first, second) = tokio::join!(
        checkout.place_order(1, cash_on_delivery()),
        other.place_order(2, cash_on_delivery()),
    );

    let results = [first, second];
    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    let failure = results.iter().find_map(|r| r.as_ref().err());
    assert_matches!(failure, Some(ServiceError::InsufficientStock(name)) if name == "Walnut Desk");

    assert_eq!(app.product_stock(desk.id).await, 0);
    assert_eq!(order::Entity::find().count(&*app.db()).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_buyers_never_oversell() {
    let app = TestApp::with_connections(4).await;
    app.set_pricing(dec!(0), dec!(0)).await;
    let lamp = app.seed_product("Desk Lamp", dec!(12.50), 3).await;
    let buyers: Vec<i32> = (1..=8).collect();
    for buyer in &buyers {
        app.add_to_cart(*buyer, lamp.id, None, 1).await;
    }

    let checkout = app.state.services.checkout.clone();
    let results = join_all(buyers.iter().map(|buyer| {
        let checkout = checkout.clone();
        let buyer = *buyer;
        async move { checkout.place_order(buyer, cash_on_delivery()).await }
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    for failure in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_matches!(failure, ServiceError::InsufficientStock(_));
    }
    assert_eq!(app.product_stock(lamp.id).await, 0);
    assert_eq!(order::Entity::find().count(&*app.db()).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn double_submit_places_one_order() {
    let app = TestApp::with_connections(4).await;
    app.set_pricing(dec!(0), dec!(0)).await;
    let desk = app.seed_product("Walnut Desk", dec!(25.00), 5).await;
    app.add_to_cart(3, desk.id, None, 1).await;

    let checkout = app.state.services.checkout.clone();
    let again = checkout.clone();
    let (first, second) = tokio::join!(
        checkout.place_order(3, cash_on_delivery()),
        again.place_order(3, cash_on_delivery()),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let failure = results.iter().find_map(|r| r.as_ref().err());
    assert_matches!(failure, Some(ServiceError::EmptyCart));

    assert_eq!(app.product_stock(desk.id).await, 4);
    assert_eq!(app.cart_len(3).await, 0);
    assert_eq!(order::Entity::find().count(&*app.db()).await.unwrap(), 1);
}
