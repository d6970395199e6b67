mod common;

use common::{create_test_product, create_test_tiered_product, create_test_warehouse, setup_db};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stocklot_api::{
    entities::{product::Entity as Product, stock_transfer},
    errors::ServiceError,
    services::StockLedgerService,
};

#[tokio::test]
async fn fifo_allocation_and_adjustment() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "FIFO widget").await;
    let warehouse = create_test_warehouse(&db, "Main").await;

    service
        .allocate(product.id, warehouse.id, 10, dec!(5), None)
        .await
        .expect("first allocation");
    let second = service
        .allocate(product.id, warehouse.id, 5, dec!(6), None)
        .await
        .expect("second allocation");

    assert_eq!(second.total, 15);
    // Oldest batch sets the current cost
    assert_eq!(second.current_cost_price, dec!(5));

    let stored = Product::find_by_id(product.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 15);
    assert_eq!(stored.base_cost, dec!(5));

    // Reducing to 3 removes 12 FIFO: the 10-unit batch disappears and the
    // 5-unit batch drops to 3
    let adjusted = service
        .adjust(product.id, warehouse.id, 3, None)
        .await
        .expect("adjustment");
    assert_eq!(adjusted.total, 3);
    assert_eq!(adjusted.current_cost_price, dec!(6));

    let view = service.get_allocations(product.id).await.unwrap();
    assert_eq!(view.total, 3);
    assert_eq!(view.current_cost_price, dec!(6));
    assert_eq!(view.allocations.len(), 1);
    assert_eq!(view.allocations[0].batches.len(), 1);
    assert_eq!(view.allocations[0].batches[0].quantity, 3);
    assert_eq!(view.allocations[0].batches[0].cost_price, dec!(6));

    let stored = Product::find_by_id(product.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 3);
    assert_eq!(stored.base_cost, dec!(6));
}

#[tokio::test]
async fn allocation_rejects_invalid_input() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Validation widget").await;
    let warehouse = create_test_warehouse(&db, "Validation WH").await;

    let err = service
        .allocate(product.id, warehouse.id, 0, dec!(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = service
        .allocate(product.id, warehouse.id, 5, dec!(-1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let err = service
        .allocate(uuid::Uuid::new_v4(), warehouse.id, 5, dec!(1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn adjustment_cannot_increase_stock() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Adjust widget").await;
    let warehouse = create_test_warehouse(&db, "Adjust WH").await;

    service
        .allocate(product.id, warehouse.id, 8, dec!(4), None)
        .await
        .unwrap();

    let err = service
        .adjust(product.id, warehouse.id, 9, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Unchanged after the failed attempt
    let view = service.get_allocations(product.id).await.unwrap();
    assert_eq!(view.total, 8);
}

#[tokio::test]
async fn adjusting_to_zero_removes_the_allocation_row() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Emptied widget").await;
    let warehouse = create_test_warehouse(&db, "Emptied WH").await;

    service
        .allocate(product.id, warehouse.id, 5, dec!(2), None)
        .await
        .unwrap();
    let adjusted = service
        .adjust(product.id, warehouse.id, 0, None)
        .await
        .unwrap();
    assert_eq!(adjusted.total, 0);
    assert_eq!(adjusted.current_cost_price, dec!(0));

    let view = service.get_allocations(product.id).await.unwrap();
    assert!(view.allocations.is_empty());
    assert_eq!(view.total, 0);
    assert_eq!(view.current_cost_price, dec!(0));

    let stored = Product::find_by_id(product.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 0);
    assert_eq!(stored.base_cost, dec!(0));
}

#[tokio::test]
async fn transfer_preserves_cost_and_age_of_moved_slices() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Moved widget").await;
    let source = create_test_warehouse(&db, "Source").await;
    let destination = create_test_warehouse(&db, "Destination").await;

    service
        .allocate(product.id, source.id, 10, dec!(5), None)
        .await
        .unwrap();
    service
        .allocate(product.id, source.id, 5, dec!(6), None)
        .await
        .unwrap();

    let before = service.get_allocations(product.id).await.unwrap();
    let source_batches = &before.allocations[0].batches;
    let oldest_added_at = source_batches[0].added_at;

    let outcome = service
        .transfer(product.id, source.id, destination.id, 12, None, None, None)
        .await
        .expect("transfer");
    assert_eq!(outcome.destination_total, 12);
    assert_eq!(outcome.destination_current_cost_price, dec!(5));

    let after = service.get_allocations(product.id).await.unwrap();
    // Product-wide stock is conserved
    assert_eq!(after.total, 15);
    assert_eq!(after.current_cost_price, dec!(5));

    let dest_row = after
        .allocations
        .iter()
        .find(|a| a.warehouse_id == destination.id)
        .expect("destination allocation");
    assert_eq!(dest_row.quantity, 12);
    assert_eq!(dest_row.batches.len(), 2);
    assert_eq!(dest_row.batches[0].quantity, 10);
    assert_eq!(dest_row.batches[0].cost_price, dec!(5));
    assert_eq!(dest_row.batches[0].added_at, oldest_added_at);
    assert_eq!(dest_row.batches[1].quantity, 2);
    assert_eq!(dest_row.batches[1].cost_price, dec!(6));

    let source_row = after
        .allocations
        .iter()
        .find(|a| a.warehouse_id == source.id)
        .expect("source allocation");
    assert_eq!(source_row.quantity, 3);
    assert_eq!(source_row.current_cost_price, dec!(6));

    let records = stock_transfer::Entity::find()
        .filter(stock_transfer::Column::ProductId.eq(product.id))
        .all(db.as_ref())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, 12);
    assert_eq!(records[0].from_warehouse_id, source.id);
    assert_eq!(records[0].to_warehouse_id, destination.id);
}

#[tokio::test]
async fn failed_transfer_leaves_source_untouched() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Stubborn widget").await;
    let source = create_test_warehouse(&db, "Stubborn source").await;
    let destination = create_test_warehouse(&db, "Stubborn destination").await;

    service
        .allocate(product.id, source.id, 4, dec!(7), None)
        .await
        .unwrap();
    let before = service.get_allocations(product.id).await.unwrap();

    let err = service
        .transfer(product.id, source.id, destination.id, 5, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let after = service.get_allocations(product.id).await.unwrap();
    assert_eq!(after.total, before.total);
    assert_eq!(after.allocations.len(), 1);
    assert_eq!(
        after.allocations[0].batches[0].batch_id,
        before.allocations[0].batches[0].batch_id
    );
    assert_eq!(after.allocations[0].batches[0].quantity, 4);

    let records = stock_transfer::Entity::find()
        .filter(stock_transfer::Column::ProductId.eq(product.id))
        .all(db.as_ref())
        .await
        .unwrap();
    assert!(records.is_empty());

    let err = service
        .transfer(product.id, source.id, source.id, 1, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn allocation_rejects_a_tier_the_product_does_not_have() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_tiered_product(&db, "Two-tier widget", &["wholesale"]).await;
    let warehouse = create_test_warehouse(&db, "Two-tier WH").await;

    // A mistyped tier must not open a fresh stock scope
    let err = service
        .allocate(
            product.id,
            warehouse.id,
            5,
            dec!(3),
            Some("wholesle".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ValidationError(_)));

    let view = service.get_allocations(product.id).await.unwrap();
    assert!(view.allocations.is_empty());
    assert_eq!(view.total, 0);

    // The tier the product actually carries is accepted
    service
        .allocate(
            product.id,
            warehouse.id,
            5,
            dec!(3),
            Some("wholesale".to_string()),
        )
        .await
        .expect("known tier");
}

#[tokio::test]
async fn price_tiers_scope_stock_independently() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_tiered_product(&db, "Tiered widget", &["wholesale"]).await;
    let warehouse = create_test_warehouse(&db, "Tiered WH").await;

    service
        .allocate(product.id, warehouse.id, 10, dec!(5), None)
        .await
        .unwrap();
    service
        .allocate(
            product.id,
            warehouse.id,
            6,
            dec!(4),
            Some("wholesale".to_string()),
        )
        .await
        .unwrap();

    let view = service.get_allocations(product.id).await.unwrap();
    assert_eq!(view.total, 16);
    assert_eq!(view.allocations.len(), 2);

    // Adjusting the tier row never touches the untiered row
    service
        .adjust(product.id, warehouse.id, 2, Some("wholesale".to_string()))
        .await
        .unwrap();

    let view = service.get_allocations(product.id).await.unwrap();
    assert_eq!(view.total, 12);
    let untiered = view
        .allocations
        .iter()
        .find(|a| a.price_tier_id.is_none())
        .unwrap();
    assert_eq!(untiered.quantity, 10);
    let tiered = view
        .allocations
        .iter()
        .find(|a| a.price_tier_id.as_deref() == Some("wholesale"))
        .unwrap();
    assert_eq!(tiered.quantity, 2);
}

#[tokio::test]
async fn quantity_is_conserved_across_operation_sequences() {
    let db = setup_db().await;
    let service = StockLedgerService::new(db.clone(), None);

    let product = create_test_product(&db, "Conserved widget").await;
    let w1 = create_test_warehouse(&db, "Conserved W1").await;
    let w2 = create_test_warehouse(&db, "Conserved W2").await;

    service
        .allocate(product.id, w1.id, 20, dec!(3), None)
        .await
        .unwrap();
    service
        .allocate(product.id, w1.id, 10, dec!(4), None)
        .await
        .unwrap();
    service
        .transfer(product.id, w1.id, w2.id, 15, None, None, None)
        .await
        .unwrap();
    service.adjust(product.id, w1.id, 5, None).await.unwrap();
    service
        .allocate(product.id, w2.id, 7, dec!(5), None)
        .await
        .unwrap();

    // 30 allocated to W1, 15 moved to W2, W1 trimmed from 15 to 5, 7 more
    // into W2: 5 + 15 + 7
    let view = service.get_allocations(product.id).await.unwrap();
    assert_eq!(view.total, 27);

    let stored = Product::find_by_id(product.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.stock, 27);
}
