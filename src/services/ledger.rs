use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as ProductEntity, PriceTier},
        stock_allocation::{self, Entity as StockAllocation},
        stock_batch::{self, Entity as StockBatch},
        stock_transfer,
        warehouse::Entity as WarehouseEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One slice of stock taken from a batch during FIFO depletion. Slices keep
/// the originating batch's cost price and timestamp so transfers can replay
/// them unchanged at the destination.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSlice {
    pub batch_id: Uuid,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub added_at: DateTime<Utc>,
}

/// Outcome of planning a FIFO removal over a sorted batch list: which batch
/// rows empty out entirely, which single batch absorbs the remainder, and the
/// exact slices taken in oldest-first order.
#[derive(Debug, Clone, PartialEq)]
pub struct DepletionPlan {
    pub emptied: Vec<Uuid>,
    pub reduced: Option<(Uuid, i32)>,
    pub slices: Vec<BatchSlice>,
}

/// Sorts batches into FIFO order: ascending `added_at`, batch id as the
/// tie-break (ids are UUID v7, so the tie-break follows creation order).
pub fn sort_fifo(batches: &mut [stock_batch::Model]) {
    batches.sort_by(|a, b| (a.added_at, a.id).cmp(&(b.added_at, b.id)));
}

/// Plans the removal of `qty` units from `batches` (which must already be in
/// FIFO order). Validates sufficiency first: returns `None` when the batches
/// cannot cover the request, in which case nothing may be mutated. Whole
/// batches are consumed from the head; at most one batch is partially
/// decremented.
pub fn plan_depletion(batches: &[stock_batch::Model], qty: i32) -> Option<DepletionPlan> {
    let available: i64 = batches.iter().map(|b| b.quantity as i64).sum();
    if qty <= 0 || (qty as i64) > available {
        return None;
    }

    let mut remaining = qty;
    let mut emptied = Vec::new();
    let mut reduced = None;
    let mut slices = Vec::new();

    for batch in batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity);
        slices.push(BatchSlice {
            batch_id: batch.id,
            quantity: take,
            cost_price: batch.cost_price,
            added_at: batch.added_at,
        });
        if take == batch.quantity {
            emptied.push(batch.id);
        } else {
            reduced = Some((batch.id, batch.quantity - take));
        }
        remaining -= take;
    }

    Some(DepletionPlan {
        emptied,
        reduced,
        slices,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchView {
    pub batch_id: Uuid,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationView {
    pub allocation_id: Uuid,
    pub warehouse_id: Uuid,
    pub price_tier_id: Option<String>,
    pub quantity: i32,
    /// Cost of the row's oldest batch.
    pub current_cost_price: Decimal,
    pub batches: Vec<BatchView>,
}

/// Aggregated ledger view for one product across all warehouses and tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductAllocationsView {
    pub product_id: Uuid,
    pub total: i32,
    /// Cost of the globally-oldest batch across all allocations.
    pub current_cost_price: Decimal,
    pub allocations: Vec<AllocationView>,
    pub price_tiers: Vec<PriceTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateOutcome {
    pub allocation: AllocationView,
    /// Product-wide total after the allocation.
    pub total: i32,
    pub batch_id: Uuid,
    pub current_cost_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustOutcome {
    /// Row total after the adjustment (zero when the row was deleted).
    pub total: i32,
    pub current_cost_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer: stock_transfer::Model,
    pub destination_total: i32,
    pub destination_current_cost_price: Decimal,
}

/// Service owning the FIFO cost-lot ledger: one allocation row per
/// (product, warehouse, price tier), each holding an ordered batch list.
/// Every mutation runs in a single transaction and finishes by resyncing the
/// product's denormalized `stock`/`base_cost` aggregates.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send ledger event");
            }
        }
    }

    /// Aggregated allocation view for a product. Read-only and
    /// non-transactional: may observe an in-flight mutation's staleness
    /// window.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_allocations(
        &self,
        product_id: Uuid,
    ) -> Result<ProductAllocationsView, ServiceError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        build_allocations_view(db, &product).await
    }

    /// Appends a new batch to the (product, warehouse, tier) row, creating
    /// the row on first use.
    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id, qty = qty))]
    pub async fn allocate(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        qty: i32,
        cost_price: Decimal,
        price_tier_id: Option<String>,
    ) -> Result<AllocateOutcome, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(
                "Allocation quantity must be positive".to_string(),
            ));
        }
        if cost_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Cost price cannot be negative".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let outcome = db
            .transaction::<_, AllocateOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    let product = ProductEntity::find_by_id(product_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Product {} not found", product_id))
                        })?;
                    if let Some(tier) = price_tier_id.as_deref() {
                        if !product.has_tier(tier) {
                            return Err(ServiceError::ValidationError(format!(
                                "Product '{}' has no price tier '{}'",
                                product.name, tier
                            )));
                        }
                    }
                    WarehouseEntity::find_by_id(warehouse_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Warehouse {} not found", warehouse_id))
                        })?;

                    let allocation = find_or_create_allocation(
                        txn,
                        product_id,
                        warehouse_id,
                        price_tier_id.clone(),
                    )
                    .await?;

                    let batch = stock_batch::ActiveModel {
                        id: Set(Uuid::now_v7()),
                        allocation_id: Set(allocation.id),
                        quantity: Set(qty),
                        cost_price: Set(cost_price),
                        added_at: Set(Utc::now()),
                    };
                    let batch = batch.insert(txn).await.map_err(ServiceError::db_error)?;

                    let total = resync_product_aggregates(txn, product_id).await?;

                    let row = load_allocation_view(txn, &allocation).await?;
                    let current_cost_price = row.current_cost_price;

                    Ok(AllocateOutcome {
                        allocation: row,
                        total,
                        batch_id: batch.id,
                        current_cost_price,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(product_id = %product_id, warehouse_id = %warehouse_id, qty = qty, batch_id = %outcome.batch_id, "Stock allocated");
        self.emit(Event::StockAllocated {
            product_id,
            warehouse_id,
            batch_id: outcome.batch_id,
            quantity: qty,
        })
        .await;

        Ok(outcome)
    }

    /// Sets the row's total to `target_qty` by removing the difference in
    /// FIFO order. Only ever reduces stock; increases go through `allocate`.
    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id, target_qty = target_qty))]
    pub async fn adjust(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        target_qty: i32,
        price_tier_id: Option<String>,
    ) -> Result<AdjustOutcome, ServiceError> {
        if target_qty < 0 {
            return Err(ServiceError::ValidationError(
                "Target quantity cannot be negative".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let (outcome, old_quantity) = db
            .transaction::<_, (AdjustOutcome, i32), ServiceError>(move |txn| {
                Box::pin(async move {
                    let allocation =
                        find_allocation(txn, product_id, warehouse_id, price_tier_id.as_deref())
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "No stock allocation for product {} in warehouse {}",
                                    product_id, warehouse_id
                                ))
                            })?;

                    let mut batches = load_batches(txn, allocation.id).await?;
                    sort_fifo(&mut batches);
                    let current: i32 = batches.iter().map(|b| b.quantity).sum();

                    if target_qty > current {
                        return Err(ServiceError::Conflict(format!(
                            "Adjustment can only reduce stock: current {}, requested {}",
                            current, target_qty
                        )));
                    }

                    if target_qty < current {
                        let plan = plan_depletion(&batches, current - target_qty).ok_or_else(
                            || {
                                ServiceError::InternalError(
                                    "Depletion planning failed after sufficiency check".to_string(),
                                )
                            },
                        )?;
                        apply_depletion(txn, &plan).await?;
                        delete_allocation_if_empty(txn, allocation.id).await?;
                        resync_product_aggregates(txn, product_id).await?;
                    }

                    let mut remaining = load_batches(txn, allocation.id).await?;
                    sort_fifo(&mut remaining);
                    let current_cost_price = remaining
                        .first()
                        .map(|b| b.cost_price)
                        .unwrap_or(Decimal::ZERO);

                    Ok((
                        AdjustOutcome {
                            total: target_qty,
                            current_cost_price,
                        },
                        current,
                    ))
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(product_id = %product_id, warehouse_id = %warehouse_id, old_quantity, new_quantity = target_qty, "Stock adjusted");
        self.emit(Event::StockAdjusted {
            product_id,
            warehouse_id,
            old_quantity,
            new_quantity: target_qty,
        })
        .await;

        Ok(outcome)
    }

    /// Moves `qty` units between warehouses, preserving each moved slice's
    /// cost price and original timestamp, and appends a transfer record.
    #[instrument(skip(self), fields(product_id = %product_id, from = %from_warehouse_id, to = %to_warehouse_id, qty = qty))]
    pub async fn transfer(
        &self,
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        qty: i32,
        price_tier_id: Option<String>,
        note: Option<String>,
        performed_by: Option<String>,
    ) -> Result<TransferOutcome, ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::ValidationError(
                "Transfer quantity must be positive".to_string(),
            ));
        }
        if from_warehouse_id == to_warehouse_id {
            return Err(ServiceError::ValidationError(
                "Source and destination warehouses must differ".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let outcome = db
            .transaction::<_, TransferOutcome, ServiceError>(move |txn| {
                Box::pin(async move {
                    ProductEntity::find_by_id(product_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Product {} not found", product_id))
                        })?;

                    // Insufficient source stock is a Conflict for transfers,
                    // unlike the settlement path.
                    let slices = consume_in_txn(
                        txn,
                        product_id,
                        from_warehouse_id,
                        qty,
                        price_tier_id.as_deref(),
                    )
                    .await
                    .map_err(|e| match e {
                        ServiceError::InsufficientStock(msg) => ServiceError::Conflict(msg),
                        other => other,
                    })?;

                    let destination = find_or_create_allocation(
                        txn,
                        product_id,
                        to_warehouse_id,
                        price_tier_id.clone(),
                    )
                    .await?;

                    // Replay the removed slices at the destination. Fresh v7
                    // ids issued in slice order keep the FIFO tie-break
                    // consistent with the preserved timestamps.
                    for slice in &slices {
                        let batch = stock_batch::ActiveModel {
                            id: Set(Uuid::now_v7()),
                            allocation_id: Set(destination.id),
                            quantity: Set(slice.quantity),
                            cost_price: Set(slice.cost_price),
                            added_at: Set(slice.added_at),
                        };
                        batch.insert(txn).await.map_err(ServiceError::db_error)?;
                    }

                    resync_product_aggregates(txn, product_id).await?;

                    let record = stock_transfer::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        product_id: Set(product_id),
                        from_warehouse_id: Set(from_warehouse_id),
                        to_warehouse_id: Set(to_warehouse_id),
                        price_tier_id: Set(price_tier_id.clone()),
                        quantity: Set(qty),
                        note: Set(note.clone()),
                        performed_by: Set(performed_by.clone()),
                        created_at: Set(Utc::now()),
                    };
                    let record = record.insert(txn).await.map_err(ServiceError::db_error)?;

                    let mut dest_batches = load_batches(txn, destination.id).await?;
                    sort_fifo(&mut dest_batches);
                    let destination_total: i32 = dest_batches.iter().map(|b| b.quantity).sum();
                    let destination_current_cost_price = dest_batches
                        .first()
                        .map(|b| b.cost_price)
                        .unwrap_or(Decimal::ZERO);

                    Ok(TransferOutcome {
                        transfer: record,
                        destination_total,
                        destination_current_cost_price,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(transfer_id = %outcome.transfer.id, product_id = %product_id, qty = qty, "Stock transferred");
        self.emit(Event::StockTransferred {
            transfer_id: outcome.transfer.id,
            product_id,
            from_warehouse_id,
            to_warehouse_id,
            quantity: qty,
        })
        .await;

        Ok(outcome)
    }
}

/// Unwraps sea-orm's transaction error wrapper back into our error type.
pub(crate) fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

pub(crate) async fn find_allocation<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    price_tier_id: Option<&str>,
) -> Result<Option<stock_allocation::Model>, ServiceError> {
    let mut query = StockAllocation::find()
        .filter(stock_allocation::Column::ProductId.eq(product_id))
        .filter(stock_allocation::Column::WarehouseId.eq(warehouse_id));
    query = match price_tier_id {
        Some(tier) => query.filter(stock_allocation::Column::PriceTierId.eq(tier)),
        None => query.filter(stock_allocation::Column::PriceTierId.is_null()),
    };
    query.one(conn).await.map_err(ServiceError::db_error)
}

async fn find_or_create_allocation<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    price_tier_id: Option<String>,
) -> Result<stock_allocation::Model, ServiceError> {
    if let Some(existing) =
        find_allocation(conn, product_id, warehouse_id, price_tier_id.as_deref()).await?
    {
        return Ok(existing);
    }

    let allocation = stock_allocation::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        warehouse_id: Set(warehouse_id),
        price_tier_id: Set(price_tier_id),
        created_at: Set(Utc::now()),
    };
    allocation.insert(conn).await.map_err(ServiceError::db_error)
}

pub(crate) async fn load_batches<C: ConnectionTrait>(
    conn: &C,
    allocation_id: Uuid,
) -> Result<Vec<stock_batch::Model>, ServiceError> {
    StockBatch::find()
        .filter(stock_batch::Column::AllocationId.eq(allocation_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Units currently available in the (product, warehouse, tier) scope. Zero
/// when no allocation row exists.
pub(crate) async fn available_quantity<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    price_tier_id: Option<&str>,
) -> Result<i32, ServiceError> {
    match find_allocation(conn, product_id, warehouse_id, price_tier_id).await? {
        Some(allocation) => {
            let batches = load_batches(conn, allocation.id).await?;
            Ok(batches.iter().map(|b| b.quantity).sum())
        }
        None => Ok(0),
    }
}

async fn apply_depletion<C: ConnectionTrait>(
    conn: &C,
    plan: &DepletionPlan,
) -> Result<(), ServiceError> {
    for batch_id in &plan.emptied {
        StockBatch::delete_by_id(*batch_id)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }
    if let Some((batch_id, new_quantity)) = plan.reduced {
        let batch = StockBatch::find_by_id(batch_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::InternalError(format!("Planned batch {} disappeared", batch_id))
            })?;
        let mut active: stock_batch::ActiveModel = batch.into();
        active.quantity = Set(new_quantity);
        active.update(conn).await.map_err(ServiceError::db_error)?;
    }
    Ok(())
}

async fn delete_allocation_if_empty<C: ConnectionTrait>(
    conn: &C,
    allocation_id: Uuid,
) -> Result<(), ServiceError> {
    let remaining = load_batches(conn, allocation_id).await?;
    if remaining.is_empty() {
        StockAllocation::delete_by_id(allocation_id)
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
    }
    Ok(())
}

/// FIFO-removes `qty` units from the (product, warehouse, tier) row inside
/// the caller's transaction, returning the exact slices removed. All or
/// nothing: on insufficiency the row is left untouched. The caller is
/// responsible for running the aggregate resync before committing.
pub(crate) async fn consume_in_txn<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    warehouse_id: Uuid,
    qty: i32,
    price_tier_id: Option<&str>,
) -> Result<Vec<BatchSlice>, ServiceError> {
    let allocation = find_allocation(conn, product_id, warehouse_id, price_tier_id).await?;
    let allocation = match allocation {
        Some(a) => a,
        None => {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {} has no stock in warehouse {}",
                product_id, warehouse_id
            )))
        }
    };

    let mut batches = load_batches(conn, allocation.id).await?;
    sort_fifo(&mut batches);
    let available: i32 = batches.iter().map(|b| b.quantity).sum();

    let plan = plan_depletion(&batches, qty).ok_or_else(|| {
        ServiceError::InsufficientStock(format!(
            "Product {}: requested {}, available {}",
            product_id, qty, available
        ))
    })?;

    apply_depletion(conn, &plan).await?;
    delete_allocation_if_empty(conn, allocation.id).await?;

    Ok(plan.slices)
}

/// Recomputes the product's denormalized aggregates from the ledger, inside
/// the mutating transaction: `stock` is the batch-quantity sum across all of
/// the product's allocations; `base_cost` is the cost of the globally-oldest
/// batch by `(added_at, id)`. Returns the new stock total.
pub(crate) async fn resync_product_aggregates<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<i32, ServiceError> {
    let product = ProductEntity::find_by_id(product_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    let allocations = StockAllocation::find()
        .filter(stock_allocation::Column::ProductId.eq(product_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut all_batches = Vec::new();
    for allocation in &allocations {
        all_batches.extend(load_batches(conn, allocation.id).await?);
    }
    sort_fifo(&mut all_batches);

    let total: i32 = all_batches.iter().map(|b| b.quantity).sum();
    let base_cost = all_batches
        .first()
        .map(|b| b.cost_price)
        .unwrap_or(Decimal::ZERO);

    let mut active: product::ActiveModel = product.into();
    active.stock = Set(total);
    active.base_cost = Set(base_cost);
    active.updated_at = Set(Some(Utc::now()));
    active.update(conn).await.map_err(ServiceError::db_error)?;

    Ok(total)
}

async fn load_allocation_view<C: ConnectionTrait>(
    conn: &C,
    allocation: &stock_allocation::Model,
) -> Result<AllocationView, ServiceError> {
    let mut batches = load_batches(conn, allocation.id).await?;
    sort_fifo(&mut batches);

    let quantity = batches.iter().map(|b| b.quantity).sum();
    let current_cost_price = batches
        .first()
        .map(|b| b.cost_price)
        .unwrap_or(Decimal::ZERO);

    Ok(AllocationView {
        allocation_id: allocation.id,
        warehouse_id: allocation.warehouse_id,
        price_tier_id: allocation.price_tier_id.clone(),
        quantity,
        current_cost_price,
        batches: batches
            .into_iter()
            .map(|b| BatchView {
                batch_id: b.id,
                quantity: b.quantity,
                cost_price: b.cost_price,
                added_at: b.added_at,
            })
            .collect(),
    })
}

pub(crate) async fn build_allocations_view<C: ConnectionTrait>(
    conn: &C,
    product: &product::Model,
) -> Result<ProductAllocationsView, ServiceError> {
    let allocations = StockAllocation::find()
        .filter(stock_allocation::Column::ProductId.eq(product.id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut rows = Vec::with_capacity(allocations.len());
    let mut oldest: Option<(DateTime<Utc>, Uuid, Decimal)> = None;
    let mut total = 0;

    for allocation in &allocations {
        let view = load_allocation_view(conn, allocation).await?;
        total += view.quantity;
        if let Some(first) = view.batches.first() {
            let key = (first.added_at, first.batch_id, first.cost_price);
            match oldest {
                Some((at, id, _)) if (at, id) <= (key.0, key.1) => {}
                _ => oldest = Some(key),
            }
        }
        rows.push(view);
    }

    Ok(ProductAllocationsView {
        product_id: product.id,
        total,
        current_cost_price: oldest.map(|(_, _, cost)| cost).unwrap_or(Decimal::ZERO),
        allocations: rows,
        price_tiers: product.tiers(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn batch(seq: i64, quantity: i32, cost: Decimal) -> stock_batch::Model {
        stock_batch::Model {
            id: Uuid::now_v7(),
            allocation_id: Uuid::nil(),
            quantity,
            cost_price: cost,
            added_at: Utc.timestamp_opt(1_700_000_000 + seq, 0).unwrap(),
        }
    }

    #[test]
    fn depletion_spans_batches_oldest_first() {
        // allocate 10 @ 5 then 5 @ 6; consuming 12 empties the first batch
        // and leaves 3 in the second
        let batches = vec![batch(0, 10, dec!(5)), batch(1, 5, dec!(6))];
        let plan = plan_depletion(&batches, 12).expect("sufficient stock");

        assert_eq!(plan.emptied, vec![batches[0].id]);
        assert_eq!(plan.reduced, Some((batches[1].id, 3)));
        assert_eq!(plan.slices.len(), 2);
        assert_eq!(plan.slices[0].quantity, 10);
        assert_eq!(plan.slices[0].cost_price, dec!(5));
        assert_eq!(plan.slices[1].quantity, 2);
        assert_eq!(plan.slices[1].cost_price, dec!(6));
    }

    #[test]
    fn partial_consumption_never_touches_newer_batches() {
        let batches = vec![batch(0, 10, dec!(5)), batch(1, 5, dec!(6))];
        let plan = plan_depletion(&batches, 4).expect("sufficient stock");

        assert!(plan.emptied.is_empty());
        assert_eq!(plan.reduced, Some((batches[0].id, 6)));
        assert_eq!(plan.slices.len(), 1);
        assert_eq!(plan.slices[0].batch_id, batches[0].id);
    }

    #[test]
    fn exact_consumption_empties_without_partial() {
        let batches = vec![batch(0, 10, dec!(5)), batch(1, 5, dec!(6))];
        let plan = plan_depletion(&batches, 15).expect("sufficient stock");

        assert_eq!(plan.emptied.len(), 2);
        assert_eq!(plan.reduced, None);
    }

    #[test]
    fn insufficiency_returns_none() {
        let batches = vec![batch(0, 10, dec!(5))];
        assert_eq!(plan_depletion(&batches, 11), None);
        assert_eq!(plan_depletion(&batches, 0), None);
        assert_eq!(plan_depletion(&[], 1), None);
    }

    #[test]
    fn fifo_sort_breaks_timestamp_ties_by_id() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut a = batch(0, 1, dec!(1));
        let mut b = batch(0, 1, dec!(2));
        a.added_at = at;
        b.added_at = at;

        let mut batches = vec![b.clone(), a.clone()];
        sort_fifo(&mut batches);
        // v7 ids are time-ordered: a was created first
        assert_eq!(batches[0].id, a.id);
        assert_eq!(batches[1].id, b.id);
    }

    proptest! {
        /// Quantity is conserved: whatever a plan removes equals the request,
        /// and what remains is the prior total minus the request.
        #[test]
        fn depletion_conserves_quantity(
            quantities in proptest::collection::vec(1..500i32, 1..8),
            request in 1..1000i32,
        ) {
            let batches: Vec<_> = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| batch(i as i64, *q, dec!(3)))
                .collect();
            let total: i32 = quantities.iter().sum();

            match plan_depletion(&batches, request) {
                None => prop_assert!(request > total),
                Some(plan) => {
                    prop_assert!(request <= total);
                    let removed: i32 = plan.slices.iter().map(|s| s.quantity).sum();
                    prop_assert_eq!(removed, request);

                    let emptied_sum: i32 = batches
                        .iter()
                        .filter(|b| plan.emptied.contains(&b.id))
                        .map(|b| b.quantity)
                        .sum();
                    let reduced_removed = plan.reduced.map_or(0, |(id, new_qty)| {
                        let before = batches.iter().find(|b| b.id == id).unwrap().quantity;
                        before - new_qty
                    });
                    prop_assert_eq!(emptied_sum + reduced_removed, request);
                }
            }
        }
    }
}
