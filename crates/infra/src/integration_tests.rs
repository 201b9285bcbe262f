//! Integration tests for the transition engine against the in-memory store.
//!
//! The PostgreSQL backend shares the same engine code path; what changes is
//! only who provides the locks and the rollback.

use std::sync::Arc;

use chrono::NaiveDate;

use bakehouse_catalog::Product;
use bakehouse_core::{CustomerId, EmployeeId, OrderId, ProductId};
use bakehouse_orders::{DeliveryDetails, DraftLine, OrderDraft, OrderStatus};

use crate::engine::{PlaceOrderError, TransitionEngine, TransitionError};
use crate::store::r#trait::OrderStore;
use crate::store::InMemoryOrderStore;

fn sku(s: &str) -> ProductId {
    ProductId::parse(s).unwrap()
}

fn oid(s: &str) -> OrderId {
    OrderId::parse(s).unwrap()
}

fn delivery() -> DeliveryDetails {
    DeliveryDetails {
        receiver: "Linh Tran".to_string(),
        phone: "0912345678".to_string(),
        address: "12 Bakery Lane".to_string(),
        note: None,
        date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        slot: "08:00-10:00".to_string(),
    }
}

fn draft(order_id: &str, lines: Vec<(&str, i64, u64)>) -> OrderDraft {
    OrderDraft {
        id: oid(order_id),
        customer: Some(CustomerId::new(7)),
        employee: None,
        delivery: delivery(),
        lines: lines
            .into_iter()
            .map(|(product, quantity, unit_price)| DraftLine {
                product_id: sku(product),
                quantity,
                unit_price,
            })
            .collect(),
    }
}

fn setup() -> (TransitionEngine<Arc<InMemoryOrderStore>>, Arc<InMemoryOrderStore>) {
    bakehouse_observability::init();
    let store = Arc::new(InMemoryOrderStore::new());
    (TransitionEngine::new(store.clone()), store)
}

async fn seed_product(store: &InMemoryOrderStore, id: &str, stock: i64) {
    let product = Product::new(sku(id), format!("{id} (test)"), 4_500, stock).unwrap();
    store.upsert_product(&product).await.unwrap();
}

async fn stock_of(store: &InMemoryOrderStore, id: &str) -> i64 {
    store.product(&sku(id)).await.unwrap().unwrap().stock
}

async fn status_of(store: &InMemoryOrderStore, id: &str) -> OrderStatus {
    store.order(&oid(id)).await.unwrap().unwrap().status
}

#[tokio::test]
async fn confirm_reserves_stock() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    engine
        .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
        .await
        .unwrap();

    assert_eq!(stock_of(&store, "SKU-P1").await, 3);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Confirmed);
}

#[tokio::test]
async fn confirm_fails_when_stock_is_short() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 1).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    let err = engine
        .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
        .await
        .unwrap_err();

    assert!(
        matches!(&err, TransitionError::InsufficientStock { product_id } if *product_id == sku("SKU-P1"))
    );
    assert_eq!(stock_of(&store, "SKU-P1").await, 1);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Pending);
}

#[tokio::test]
async fn cancel_after_confirm_releases_the_reservation() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    engine
        .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(stock_of(&store, "SKU-P1").await, 3);

    engine
        .transition_order_status(&oid("O1"), OrderStatus::Cancelled)
        .await
        .unwrap();

    // Net-zero stock effect across reserve + release.
    assert_eq!(stock_of(&store, "SKU-P1").await, 5);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn cancel_before_confirm_leaves_stock_alone() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    engine
        .transition_order_status(&oid("O1"), OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(stock_of(&store, "SKU-P1").await, 5);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn delivery_edges_have_no_stock_effect() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    for target in [
        OrderStatus::Confirmed,
        OrderStatus::Delivering,
        OrderStatus::Completed,
    ] {
        engine
            .transition_order_status(&oid("O1"), target)
            .await
            .unwrap();
    }

    // Reserved at confirmation, committed for good at completion.
    assert_eq!(stock_of(&store, "SKU-P1").await, 3);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Completed);
}

#[tokio::test]
async fn completed_orders_reject_every_target_without_state_change() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();
    for target in [
        OrderStatus::Confirmed,
        OrderStatus::Delivering,
        OrderStatus::Completed,
    ] {
        engine
            .transition_order_status(&oid("O1"), target)
            .await
            .unwrap();
    }

    for target in OrderStatus::ALL {
        // Rejection is idempotent: same verdict both times, no state change.
        for _ in 0..2 {
            let err = engine
                .transition_order_status(&oid("O1"), target)
                .await
                .unwrap_err();
            match err {
                TransitionError::InvalidTransition(rejected) => {
                    assert_eq!(rejected.from, OrderStatus::Completed);
                    assert_eq!(rejected.to, target);
                }
                other => panic!("expected InvalidTransition, got {other:?}"),
            }
        }
    }

    assert_eq!(stock_of(&store, "SKU-P1").await, 3);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Completed);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let (engine, _store) = setup();
    let err = engine
        .transition_order_status(&oid("O-MISSING"), OrderStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::NotFound));
}

#[tokio::test]
async fn short_second_line_leaves_the_first_product_untouched() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-A", 10).await;
    seed_product(&store, "SKU-B", 1).await;
    engine
        .place_order(draft("O1", vec![("SKU-A", 2, 4_500), ("SKU-B", 3, 6_000)]))
        .await
        .unwrap();

    let err = engine
        .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
        .await
        .unwrap_err();

    assert!(
        matches!(&err, TransitionError::InsufficientStock { product_id } if *product_id == sku("SKU-B"))
    );
    // All-or-nothing across lines: the staged SKU-A decrement was discarded.
    assert_eq!(stock_of(&store, "SKU-A").await, 10);
    assert_eq!(stock_of(&store, "SKU-B").await, 1);
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_of_one_order_let_exactly_one_win() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1);

    let loser = results.into_iter().find(Result::is_err).unwrap().unwrap_err();
    match loser {
        TransitionError::InvalidTransition(rejected) => {
            // The loser re-validated against the advanced status.
            assert_eq!(rejected.from, OrderStatus::Confirmed);
            assert_eq!(rejected.to, OrderStatus::Confirmed);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    // Reserved exactly once.
    assert_eq!(stock_of(&store, "SKU-P1").await, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_line_orders_confirm_without_deadlock() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-APPLE", 2).await;
    seed_product(&store, "SKU-BRIOCHE", 2).await;
    engine
        .place_order(draft(
            "O1",
            vec![("SKU-APPLE", 1, 4_500), ("SKU-BRIOCHE", 1, 6_000)],
        ))
        .await
        .unwrap();
    engine
        .place_order(draft(
            "O2",
            vec![("SKU-BRIOCHE", 1, 6_000), ("SKU-APPLE", 1, 4_500)],
        ))
        .await
        .unwrap();

    let confirm_o1 = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .transition_order_status(&oid("O1"), OrderStatus::Confirmed)
                .await
        })
    };
    let confirm_o2 = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .transition_order_status(&oid("O2"), OrderStatus::Confirmed)
                .await
        })
    };

    confirm_o1.await.unwrap().unwrap();
    confirm_o2.await.unwrap().unwrap();

    assert_eq!(stock_of(&store, "SKU-APPLE").await, 0);
    assert_eq!(stock_of(&store, "SKU-BRIOCHE").await, 0);

    // Both transitions acquired product locks in ascending id order, no
    // matter how the lines were entered.
    let trace = store.product_lock_trace().await;
    assert_eq!(
        trace,
        vec![
            sku("SKU-APPLE"),
            sku("SKU-BRIOCHE"),
            sku("SKU-APPLE"),
            sku("SKU-BRIOCHE"),
        ]
    );
}

#[tokio::test]
async fn place_order_computes_the_total_and_starts_pending() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-BAGUETTE", 10).await;
    seed_product(&store, "SKU-TART", 10).await;

    let order = engine
        .place_order(draft(
            "O1",
            vec![("SKU-BAGUETTE", 2, 4_500), ("SKU-TART", 1, 12_000)],
        ))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total, 21_000);

    let stored = store.order(&oid("O1")).await.unwrap().unwrap();
    assert_eq!(stored, order);
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.lines[0].line_no, 1);

    // Placing never touches stock.
    assert_eq!(stock_of(&store, "SKU-BAGUETTE").await, 10);
}

#[tokio::test]
async fn duplicate_order_ids_are_rejected() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 1, 4_500)]))
        .await
        .unwrap();

    let err = engine
        .place_order(draft("O1", vec![("SKU-P1", 1, 4_500)]))
        .await
        .unwrap_err();
    assert!(matches!(err, PlaceOrderError::Storage(_)));

    // The original order is untouched.
    assert_eq!(status_of(&store, "O1").await, OrderStatus::Pending);
}

#[tokio::test]
async fn walk_in_sales_have_no_customer_and_full_workflow() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 5).await;

    let mut walk_in = draft("POS-1", vec![("SKU-P1", 1, 4_500)]);
    walk_in.customer = None;
    walk_in.employee = Some(EmployeeId::new(2001));
    engine.place_order(walk_in).await.unwrap();

    let stored = store.order(&oid("POS-1")).await.unwrap().unwrap();
    assert!(stored.is_walk_in());
    assert_eq!(stored.employee, Some(EmployeeId::new(2001)));

    // Not attributed to any customer account.
    let mine = store.orders_for_customer(CustomerId::new(7)).await.unwrap();
    assert!(mine.iter().all(|order| order.id != oid("POS-1")));

    engine
        .transition_order_status(&oid("POS-1"), OrderStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(stock_of(&store, "SKU-P1").await, 4);
}

#[tokio::test]
async fn customers_see_their_own_orders() {
    let (engine, store) = setup();
    seed_product(&store, "SKU-P1", 10).await;
    engine
        .place_order(draft("O1", vec![("SKU-P1", 1, 4_500)]))
        .await
        .unwrap();
    engine
        .place_order(draft("O2", vec![("SKU-P1", 2, 4_500)]))
        .await
        .unwrap();

    let mut other = draft("O3", vec![("SKU-P1", 1, 4_500)]);
    other.customer = Some(CustomerId::new(8));
    engine.place_order(other).await.unwrap();

    let mine = store.orders_for_customer(CustomerId::new(7)).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().any(|order| order.id == oid("O1")));
    assert!(mine.iter().any(|order| order.id == oid("O2")));
}
