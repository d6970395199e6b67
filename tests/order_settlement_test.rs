mod common;

use common::{create_test_product, create_test_tiered_product, create_test_warehouse, setup_db};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stocklot_api::{
    entities::{customer, order::Entity as Order, product::Entity as Product},
    errors::ServiceError,
    services::{
        customers::CustomerDetails,
        orders::{CreateOrder, NewOrderLine, OrderUpdate},
        settlement::LegacyLine,
        OrderService, StockLedgerService,
    },
};
use uuid::Uuid;

fn base_order() -> CreateOrder {
    CreateOrder {
        order_number: None,
        customer: None,
        warehouse_id: None,
        price_tier_id: None,
        lines: Vec::new(),
        legacy: None,
        tax_percent: Decimal::ZERO,
        order_discount: Decimal::ZERO,
        delivery_charge: Decimal::ZERO,
        delivery_paid_by_customer: false,
        payment_status: "Unpaid".to_string(),
        partial_paid_amount: Decimal::ZERO,
        notes: None,
    }
}

fn line(product_id: Option<Uuid>, selling: Decimal, cost: Decimal, qty: i32, discount: Decimal) -> NewOrderLine {
    NewOrderLine {
        product_id,
        product_name: Some("Line item".to_string()),
        selling_price: selling,
        cost_price: cost,
        quantity: qty,
        discount,
    }
}

#[tokio::test]
async fn multi_line_order_settles_and_depletes_stock() {
    let db = setup_db().await;
    let ledger = StockLedgerService::new(db.clone(), None);
    let orders = OrderService::new(db.clone(), None);

    let p1 = create_test_product(&db, "Settled widget A").await;
    let p2 = create_test_product(&db, "Settled widget B").await;
    let warehouse = create_test_warehouse(&db, "Settled WH").await;

    ledger.allocate(p1.id, warehouse.id, 10, dec!(60), None).await.unwrap();
    ledger.allocate(p2.id, warehouse.id, 5, dec!(20), None).await.unwrap();

    let request = CreateOrder {
        warehouse_id: Some(warehouse.id),
        lines: vec![
            line(Some(p1.id), dec!(100), dec!(60), 2, dec!(10)),
            line(Some(p2.id), dec!(50), dec!(20), 1, dec!(0)),
        ],
        tax_percent: dec!(10),
        order_discount: dec!(5),
        delivery_charge: dec!(20),
        delivery_paid_by_customer: true,
        ..base_order()
    };

    let result = orders.create_order(request).await.expect("order creation");
    assert_eq!(result.order.final_amount, dec!(278.50));
    assert_eq!(result.order.profit, dec!(178.50));
    assert_eq!(result.order.status, "Pending");
    assert_eq!(result.lines.len(), 2);

    // Stock consumed FIFO per line, aggregates resynced
    let stored_p1 = Product::find_by_id(p1.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored_p1.stock, 8);
    let stored_p2 = Product::find_by_id(p2.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored_p2.stock, 4);
}

#[tokio::test]
async fn later_line_shortage_rolls_back_every_line() {
    let db = setup_db().await;
    let ledger = StockLedgerService::new(db.clone(), None);
    let orders = OrderService::new(db.clone(), None);

    let p1 = create_test_product(&db, "Rollback widget A").await;
    let p2 = create_test_product(&db, "Rollback widget B").await;
    let p3 = create_test_product(&db, "Rollback widget C").await;
    let warehouse = create_test_warehouse(&db, "Rollback WH").await;

    ledger.allocate(p1.id, warehouse.id, 10, dec!(5), None).await.unwrap();
    ledger.allocate(p2.id, warehouse.id, 10, dec!(5), None).await.unwrap();
    ledger.allocate(p3.id, warehouse.id, 1, dec!(5), None).await.unwrap();

    let request = CreateOrder {
        order_number: Some("ROLLBACK-001".to_string()),
        warehouse_id: Some(warehouse.id),
        lines: vec![
            line(Some(p1.id), dec!(10), dec!(5), 3, dec!(0)),
            line(Some(p2.id), dec!(10), dec!(5), 4, dec!(0)),
            line(Some(p3.id), dec!(10), dec!(5), 2, dec!(0)),
        ],
        ..base_order()
    };

    let err = orders.create_order(request).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("requested 2, available 1"), "message was: {}", msg);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    // No partial depletion and no order row
    for (product_id, expected) in [(p1.id, 10), (p2.id, 10), (p3.id, 1)] {
        let stored = Product::find_by_id(product_id).one(db.as_ref()).await.unwrap().unwrap();
        assert_eq!(stored.stock, expected);
    }
    let orphan = Order::find()
        .filter(stocklot_api::entities::order::Column::OrderNumber.eq("ROLLBACK-001"))
        .one(db.as_ref())
        .await
        .unwrap();
    assert!(orphan.is_none());
}

#[tokio::test]
async fn order_with_a_tier_the_product_lacks_is_rejected() {
    let db = setup_db().await;
    let ledger = StockLedgerService::new(db.clone(), None);
    let orders = OrderService::new(db.clone(), None);

    let product = create_test_tiered_product(&db, "Tiered order widget", &["wholesale"]).await;
    let warehouse = create_test_warehouse(&db, "Tiered order WH").await;
    ledger
        .allocate(product.id, warehouse.id, 10, dec!(5), Some("wholesale".to_string()))
        .await
        .unwrap();

    let request = CreateOrder {
        warehouse_id: Some(warehouse.id),
        price_tier_id: Some("retial".to_string()),
        lines: vec![line(Some(product.id), dec!(10), dec!(5), 1, dec!(0))],
        ..base_order()
    };
    let err = orders.create_order(request).await.unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("retial"), "message was: {}", msg);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    // The tier the product carries goes through
    let request = CreateOrder {
        warehouse_id: Some(warehouse.id),
        price_tier_id: Some("wholesale".to_string()),
        lines: vec![line(Some(product.id), dec!(10), dec!(5), 1, dec!(0))],
        ..base_order()
    };
    orders.create_order(request).await.expect("tiered order");

    let stored = Product::find_by_id(product.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored.stock, 9);
}

#[tokio::test]
async fn legacy_order_needs_no_stock() {
    let db = setup_db().await;
    let orders = OrderService::new(db.clone(), None);

    let request = CreateOrder {
        legacy: Some(LegacyLine {
            selling_price: dec!(30),
            cost_price: dec!(12),
            quantity: 4,
        }),
        ..base_order()
    };

    let result = orders.create_order(request).await.expect("legacy order");
    assert_eq!(result.order.final_amount, dec!(120.00));
    // Legacy cost is a flat figure, not per unit
    assert_eq!(result.order.profit, dec!(108.00));
    assert_eq!(result.order.selling_price, Some(dec!(30)));
    assert_eq!(result.order.quantity, Some(4));
    assert!(result.lines.is_empty());

    // A 6-digit number was generated
    assert_eq!(result.order.order_number.len(), 6);
    assert!(result.order.order_number.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn partial_payment_tracks_remaining_amount() {
    let db = setup_db().await;
    let orders = OrderService::new(db.clone(), None);

    let request = CreateOrder {
        legacy: Some(LegacyLine {
            selling_price: dec!(100),
            cost_price: dec!(40),
            quantity: 1,
        }),
        payment_status: "Partial".to_string(),
        partial_paid_amount: dec!(25),
        ..base_order()
    };

    let result = orders.create_order(request).await.unwrap();
    assert_eq!(result.order.partial_remaining_amount, dec!(75.00));

    // Switching to Paid clears the remaining amount
    let updated = orders
        .update_order(
            result.order.id,
            OrderUpdate {
                payment_status: Some("Paid".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.order.partial_remaining_amount, dec!(0.00));
}

#[tokio::test]
async fn customer_is_resolved_by_phone_and_only_gains_missing_fields() {
    let db = setup_db().await;
    let orders = OrderService::new(db.clone(), None);

    let phone = format!("+1555{}", &Uuid::new_v4().simple().to_string()[..7]);
    let first = CreateOrder {
        customer: Some(CustomerDetails {
            phone: phone.clone(),
            name: None,
            email: None,
            address: None,
        }),
        legacy: Some(LegacyLine {
            selling_price: dec!(10),
            cost_price: dec!(5),
            quantity: 1,
        }),
        ..base_order()
    };
    let first_result = orders.create_order(first).await.unwrap();
    let customer_id = first_result.customer.as_ref().unwrap().id;

    // Second order fills the empty name
    let second = CreateOrder {
        customer: Some(CustomerDetails {
            phone: phone.clone(),
            name: Some("Ada".to_string()),
            email: None,
            address: None,
        }),
        legacy: Some(LegacyLine {
            selling_price: dec!(10),
            cost_price: dec!(5),
            quantity: 1,
        }),
        ..base_order()
    };
    let second_result = orders.create_order(second).await.unwrap();
    assert_eq!(second_result.customer.as_ref().unwrap().id, customer_id);
    assert_eq!(second_result.customer.as_ref().unwrap().name.as_deref(), Some("Ada"));

    // Third order must not overwrite the populated name
    let third = CreateOrder {
        customer: Some(CustomerDetails {
            phone: phone.clone(),
            name: Some("Grace".to_string()),
            email: Some("ada@example.com".to_string()),
            address: None,
        }),
        legacy: Some(LegacyLine {
            selling_price: dec!(10),
            cost_price: dec!(5),
            quantity: 1,
        }),
        ..base_order()
    };
    orders.create_order(third).await.unwrap();

    let stored = customer::Entity::find()
        .filter(customer::Column::Phone.eq(phone.as_str()))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.name.as_deref(), Some("Ada"));
    assert_eq!(stored.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn editing_an_order_recomputes_financials_but_never_stock() {
    let db = setup_db().await;
    let ledger = StockLedgerService::new(db.clone(), None);
    let orders = OrderService::new(db.clone(), None);

    let product = create_test_product(&db, "Edited widget").await;
    let warehouse = create_test_warehouse(&db, "Edited WH").await;
    ledger.allocate(product.id, warehouse.id, 10, dec!(4), None).await.unwrap();

    let request = CreateOrder {
        warehouse_id: Some(warehouse.id),
        lines: vec![line(Some(product.id), dec!(10), dec!(4), 2, dec!(0))],
        ..base_order()
    };
    let created = orders.create_order(request).await.unwrap();
    assert_eq!(created.order.final_amount, dec!(20.00));

    let stored = Product::find_by_id(product.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored.stock, 8);

    // Tripling the quantity on edit changes the figures only
    let updated = orders
        .update_order(
            created.order.id,
            OrderUpdate {
                lines: Some(vec![line(Some(product.id), dec!(10), dec!(4), 6, dec!(0))]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.order.final_amount, dec!(60.00));
    assert_eq!(updated.lines.len(), 1);
    assert_eq!(updated.lines[0].quantity, 6);

    let stored = Product::find_by_id(product.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored.stock, 8);
}

#[tokio::test]
async fn supplied_order_numbers_must_be_unique() {
    let db = setup_db().await;
    let orders = OrderService::new(db.clone(), None);

    let number = format!("T{}", &Uuid::new_v4().simple().to_string()[..8]);
    let request = CreateOrder {
        order_number: Some(number.clone()),
        legacy: Some(LegacyLine {
            selling_price: dec!(10),
            cost_price: dec!(5),
            quantity: 1,
        }),
        ..base_order()
    };
    orders.create_order(request.clone()).await.unwrap();

    let err = orders.create_order(request).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn cancelling_keeps_consumed_stock_deducted() {
    let db = setup_db().await;
    let ledger = StockLedgerService::new(db.clone(), None);
    let orders = OrderService::new(db.clone(), None);

    let product = create_test_product(&db, "Cancelled widget").await;
    let warehouse = create_test_warehouse(&db, "Cancelled WH").await;
    ledger.allocate(product.id, warehouse.id, 5, dec!(3), None).await.unwrap();

    let request = CreateOrder {
        warehouse_id: Some(warehouse.id),
        lines: vec![line(Some(product.id), dec!(10), dec!(3), 2, dec!(0))],
        ..base_order()
    };
    let created = orders.create_order(request).await.unwrap();

    let cancelled = orders.cancel_order(created.order.id).await.unwrap();
    assert_eq!(cancelled.status, "Cancelled");

    let err = orders.cancel_order(created.order.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let stored = Product::find_by_id(product.id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(stored.stock, 3);
}

#[tokio::test]
async fn order_content_is_required() {
    let db = setup_db().await;
    let orders = OrderService::new(db.clone(), None);

    let err = orders.create_order(base_order()).await.unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = orders
        .create_order(CreateOrder {
            payment_status: "Settled-ish".to_string(),
            legacy: Some(LegacyLine {
                selling_price: dec!(10),
                cost_price: dec!(5),
                quantity: 1,
            }),
            ..base_order()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
