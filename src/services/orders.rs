use crate::{
    db::DbPool,
    entities::{
        customer,
        order::{self, Entity as Order, PaymentStatus},
        order_line::{self, Entity as OrderLine},
        product::Entity as ProductEntity,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        customers::{self, CustomerDetails},
        ledger,
        settlement::{
            compute_settlement, LegacyLine, Settlement, SettlementInput, SettlementLine,
        },
    },
};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// One incoming order line. A `product_id` makes it a catalog line that
/// consumes stock on creation; without one it is free-form and only enters
/// settlement.
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Option<Uuid>,
    pub product_name: Option<String>,
    pub selling_price: Decimal,
    pub cost_price: Decimal,
    pub quantity: i32,
    pub discount: Decimal,
}

#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// Client-supplied order number; generated when absent.
    pub order_number: Option<String>,
    pub customer: Option<CustomerDetails>,
    /// Required when any line carries a catalog `product_id`.
    pub warehouse_id: Option<Uuid>,
    pub price_tier_id: Option<String>,
    pub lines: Vec<NewOrderLine>,
    pub legacy: Option<LegacyLine>,
    pub tax_percent: Decimal,
    pub order_discount: Decimal,
    pub delivery_charge: Decimal,
    pub delivery_paid_by_customer: bool,
    pub payment_status: String,
    pub partial_paid_amount: Decimal,
    pub notes: Option<String>,
}

/// Edit of an existing order. Recomputes the financial figures; never touches
/// stock, even when line quantities change.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub lines: Option<Vec<NewOrderLine>>,
    pub legacy: Option<LegacyLine>,
    pub tax_percent: Option<Decimal>,
    pub order_discount: Option<Decimal>,
    pub delivery_charge: Option<Decimal>,
    pub delivery_paid_by_customer: Option<bool>,
    pub payment_status: Option<String>,
    pub partial_paid_amount: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderWithLines {
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
    pub customer: Option<customer::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }

    /// Creates an order as one atomic unit: customer resolution, settlement,
    /// two-phase stock validation and FIFO consumption, aggregate resync, and
    /// the order insert all commit or roll back together.
    #[instrument(skip(self, request))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<OrderWithLines, ServiceError> {
        let payment_status = PaymentStatus::parse(&request.payment_status).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Unknown payment status '{}'",
                request.payment_status
            ))
        })?;
        validate_content(&request)?;

        let supplied_number = request
            .order_number
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        // The generate-then-check is racy between concurrent creators; the
        // unique index on order_number is the backstop, so a collision on
        // insert regenerates and retries rather than failing the request.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let order_number = match &supplied_number {
                Some(n) => n.clone(),
                None => self.generate_order_number().await?,
            };

            match self
                .create_order_txn(&request, payment_status, order_number)
                .await
            {
                Ok(result) => {
                    info!(order_id = %result.order.id, order_number = %result.order.order_number, "Order created");
                    self.emit(Event::OrderCreated(result.order.id)).await;
                    for line in &result.lines {
                        if let Some(product_id) = line.product_id {
                            self.emit(Event::StockConsumed {
                                product_id,
                                warehouse_id: request.warehouse_id.unwrap_or_default(),
                                quantity: line.quantity,
                                order_id: Some(result.order.id),
                            })
                            .await;
                        }
                    }
                    return Ok(result);
                }
                Err(e)
                    if supplied_number.is_none()
                        && is_unique_violation(&e)
                        && attempt < ORDER_NUMBER_ATTEMPTS =>
                {
                    warn!(attempt, "Order number collision, regenerating");
                    continue;
                }
                Err(e) if supplied_number.is_some() && is_unique_violation(&e) => {
                    return Err(ServiceError::Conflict(format!(
                        "Order number '{}' already exists",
                        supplied_number.as_deref().unwrap_or_default()
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn create_order_txn(
        &self,
        request: &CreateOrder,
        payment_status: PaymentStatus,
        order_number: String,
    ) -> Result<OrderWithLines, ServiceError> {
        let request = request.clone();
        let db = &*self.db_pool;

        db.transaction::<_, OrderWithLines, ServiceError>(move |txn| {
            Box::pin(async move {
                let customer = match &request.customer {
                    Some(details) => {
                        Some(customers::resolve_or_create_in_txn(txn, details).await?)
                    }
                    None => None,
                };

                let settlement = settle(&request, payment_status);

                // Phase one: confirm sufficient stock for every catalog line
                // before any depletion happens, so a later-line shortage
                // cannot leave earlier lines partially consumed.
                let warehouse_id = request.warehouse_id;
                let tier = request.price_tier_id.as_deref();
                for line in &request.lines {
                    let Some(product_id) = line.product_id else {
                        continue;
                    };
                    let warehouse_id = warehouse_id.ok_or_else(|| {
                        ServiceError::ValidationError(
                            "warehouse_id is required for catalog product lines".to_string(),
                        )
                    })?;
                    let product = ProductEntity::find_by_id(product_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Product {} not found", product_id))
                        })?;
                    if let Some(tier) = tier {
                        if !product.has_tier(tier) {
                            return Err(ServiceError::ValidationError(format!(
                                "Product '{}' has no price tier '{}'",
                                product.name, tier
                            )));
                        }
                    }

                    let available =
                        ledger::available_quantity(txn, product_id, warehouse_id, tier).await?;
                    if available < line.quantity {
                        return Err(ServiceError::ValidationError(format!(
                            "Insufficient stock for '{}': requested {}, available {}",
                            line.product_name.as_deref().unwrap_or(&product.name),
                            line.quantity,
                            available
                        )));
                    }
                }

                // Phase two: deplete FIFO per line, then resync each touched
                // product once.
                let mut touched: HashSet<Uuid> = HashSet::new();
                for line in &request.lines {
                    let Some(product_id) = line.product_id else {
                        continue;
                    };
                    let warehouse_id = warehouse_id.ok_or_else(|| {
                        ServiceError::ValidationError(
                            "warehouse_id is required for catalog product lines".to_string(),
                        )
                    })?;
                    ledger::consume_in_txn(txn, product_id, warehouse_id, line.quantity, tier)
                        .await?;
                    touched.insert(product_id);
                }
                for product_id in &touched {
                    ledger::resync_product_aggregates(txn, *product_id).await?;
                }

                let order_model = order::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_number: Set(order_number),
                    customer_id: Set(customer.as_ref().map(|c| c.id)),
                    status: Set("Pending".to_string()),
                    payment_status: Set(payment_status.as_str().to_string()),
                    tax_percent: Set(request.tax_percent),
                    order_discount: Set(request.order_discount),
                    delivery_charge: Set(request.delivery_charge),
                    delivery_paid_by_customer: Set(request.delivery_paid_by_customer),
                    partial_paid_amount: Set(request.partial_paid_amount),
                    selling_price: Set(request.legacy.map(|l| l.selling_price)),
                    cost_price: Set(request.legacy.map(|l| l.cost_price)),
                    quantity: Set(request.legacy.map(|l| l.quantity)),
                    final_amount: Set(settlement.final_amount),
                    profit: Set(settlement.profit),
                    partial_remaining_amount: Set(settlement.partial_remaining_amount),
                    notes: Set(request.notes.clone()),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                };
                let persisted = order_model
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                let mut lines = Vec::with_capacity(request.lines.len());
                for line in &request.lines {
                    let model = order_line::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(persisted.id),
                        product_id: Set(line.product_id),
                        product_name: Set(line
                            .product_name
                            .clone()
                            .unwrap_or_else(|| "Unnamed item".to_string())),
                        selling_price: Set(line.selling_price),
                        cost_price: Set(line.cost_price),
                        quantity: Set(line.quantity),
                        discount: Set(line.discount),
                    };
                    lines.push(model.insert(txn).await.map_err(ServiceError::db_error)?);
                }

                Ok(OrderWithLines {
                    order: persisted,
                    lines,
                    customer,
                })
            })
        })
        .await
        .map_err(ledger::unwrap_txn_err)
    }

    /// Recomputes an order's financial fields from edited content. Stock is
    /// never reconciled here: quantities already deducted at creation stay
    /// deducted regardless of how the lines change.
    #[instrument(skip(self, update))]
    pub async fn update_order(
        &self,
        id: Uuid,
        update: OrderUpdate,
    ) -> Result<OrderWithLines, ServiceError> {
        let db = &*self.db_pool;
        let result = db
            .transaction::<_, OrderWithLines, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = Order::find_by_id(id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("Order {} not found", id))
                        })?;
                    let existing_lines = OrderLine::find()
                        .filter(order_line::Column::OrderId.eq(id))
                        .all(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    let payment_status = match &update.payment_status {
                        Some(value) => PaymentStatus::parse(value).ok_or_else(|| {
                            ServiceError::ValidationError(format!(
                                "Unknown payment status '{}'",
                                value
                            ))
                        })?,
                        None => PaymentStatus::parse(&existing.payment_status).ok_or_else(
                            || {
                                ServiceError::InternalError(format!(
                                    "Stored payment status '{}' is invalid",
                                    existing.payment_status
                                ))
                            },
                        )?,
                    };

                    let new_lines: Vec<NewOrderLine> = match &update.lines {
                        Some(lines) => {
                            for line in lines {
                                validate_line(line)?;
                            }
                            lines.clone()
                        }
                        None => existing_lines
                            .iter()
                            .map(|l| NewOrderLine {
                                product_id: l.product_id,
                                product_name: Some(l.product_name.clone()),
                                selling_price: l.selling_price,
                                cost_price: l.cost_price,
                                quantity: l.quantity,
                                discount: l.discount,
                            })
                            .collect(),
                    };

                    let legacy = update.legacy.or_else(|| legacy_of(&existing));

                    let settlement = compute_settlement(&SettlementInput {
                        lines: new_lines
                            .iter()
                            .map(|l| SettlementLine {
                                selling_price: l.selling_price,
                                cost_price: l.cost_price,
                                quantity: l.quantity,
                                discount: l.discount,
                            })
                            .collect(),
                        legacy,
                        tax_percent: update.tax_percent.unwrap_or(existing.tax_percent),
                        delivery_charge: update
                            .delivery_charge
                            .unwrap_or(existing.delivery_charge),
                        delivery_paid_by_customer: update
                            .delivery_paid_by_customer
                            .unwrap_or(existing.delivery_paid_by_customer),
                        order_discount: update
                            .order_discount
                            .unwrap_or(existing.order_discount),
                        payment_status,
                        partial_paid_amount: update
                            .partial_paid_amount
                            .unwrap_or(existing.partial_paid_amount),
                    });

                    let customer_id = existing.customer_id;
                    let mut active: order::ActiveModel = existing.into();
                    if let Some(tax) = update.tax_percent {
                        active.tax_percent = Set(tax);
                    }
                    if let Some(discount) = update.order_discount {
                        active.order_discount = Set(discount);
                    }
                    if let Some(charge) = update.delivery_charge {
                        active.delivery_charge = Set(charge);
                    }
                    if let Some(paid_by_customer) = update.delivery_paid_by_customer {
                        active.delivery_paid_by_customer = Set(paid_by_customer);
                    }
                    if let Some(amount) = update.partial_paid_amount {
                        active.partial_paid_amount = Set(amount);
                    }
                    if let Some(notes) = update.notes.clone() {
                        active.notes = Set(Some(notes));
                    }
                    if let Some(legacy) = update.legacy {
                        active.selling_price = Set(Some(legacy.selling_price));
                        active.cost_price = Set(Some(legacy.cost_price));
                        active.quantity = Set(Some(legacy.quantity));
                    }
                    active.payment_status = Set(payment_status.as_str().to_string());
                    active.final_amount = Set(settlement.final_amount);
                    active.profit = Set(settlement.profit);
                    active.partial_remaining_amount = Set(settlement.partial_remaining_amount);
                    active.updated_at = Set(Some(Utc::now()));
                    let persisted = active.update(txn).await.map_err(ServiceError::db_error)?;

                    let lines = if update.lines.is_some() {
                        OrderLine::delete_many()
                            .filter(order_line::Column::OrderId.eq(id))
                            .exec(txn)
                            .await
                            .map_err(ServiceError::db_error)?;
                        let mut inserted = Vec::with_capacity(new_lines.len());
                        for line in &new_lines {
                            let model = order_line::ActiveModel {
                                id: Set(Uuid::new_v4()),
                                order_id: Set(id),
                                product_id: Set(line.product_id),
                                product_name: Set(line
                                    .product_name
                                    .clone()
                                    .unwrap_or_else(|| "Unnamed item".to_string())),
                                selling_price: Set(line.selling_price),
                                cost_price: Set(line.cost_price),
                                quantity: Set(line.quantity),
                                discount: Set(line.discount),
                            };
                            inserted
                                .push(model.insert(txn).await.map_err(ServiceError::db_error)?);
                        }
                        inserted
                    } else {
                        existing_lines
                    };

                    let customer = match customer_id {
                        Some(cid) => customer::Entity::find_by_id(cid)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?,
                        None => None,
                    };

                    Ok(OrderWithLines {
                        order: persisted,
                        lines,
                        customer,
                    })
                })
            })
            .await
            .map_err(ledger::unwrap_txn_err)?;

        info!(order_id = %id, "Order updated");
        self.emit(Event::OrderUpdated(id)).await;
        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        id: Uuid,
        new_status: String,
    ) -> Result<order::Model, ServiceError> {
        let new_status = new_status.trim().to_string();
        if new_status.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order status cannot be empty".to_string(),
            ));
        }

        let existing = self.find_order(id).await?;
        let old_status = existing.status.clone();

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(new_status.clone());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        info!(order_id = %id, old_status = %old_status, new_status = %new_status, "Order status changed");
        self.emit(Event::OrderStatusChanged {
            order_id: id,
            old_status,
            new_status,
        })
        .await;
        Ok(updated)
    }

    /// Marks the order cancelled. Stock consumed at creation is not restored.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        let existing = self.find_order(id).await?;
        if existing.status == "Cancelled" {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already cancelled",
                id
            )));
        }

        let mut active: order::ActiveModel = existing.into();
        active.status = Set("Cancelled".to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        info!(order_id = %id, "Order cancelled");
        self.emit(Event::OrderCancelled(id)).await;
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderWithLines, ServiceError> {
        let order = self.find_order(id).await?;
        let lines = OrderLine::find()
            .filter(order_line::Column::OrderId.eq(id))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        let customer = match order.customer_id {
            Some(cid) => customer::Entity::find_by_id(cid)
                .one(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?,
            None => None,
        };
        Ok(OrderWithLines {
            order,
            lines,
            customer,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<String>,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db_pool, per_page.clamp(1, 100));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((orders, total))
    }

    async fn find_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    /// Random 6-digit candidate checked against existing numbers. Bounded
    /// retries; the unique index catches the remaining race.
    async fn generate_order_number(&self) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = {
                let mut rng = rand::thread_rng();
                format!("{}", rng.gen_range(100_000..1_000_000))
            };
            let exists = Order::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .one(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?
                .is_some();
            if !exists {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Conflict(
            "Could not generate a unique order number".to_string(),
        ))
    }
}

fn settle(request: &CreateOrder, payment_status: PaymentStatus) -> Settlement {
    compute_settlement(&SettlementInput {
        lines: request
            .lines
            .iter()
            .map(|l| SettlementLine {
                selling_price: l.selling_price,
                cost_price: l.cost_price,
                quantity: l.quantity,
                discount: l.discount,
            })
            .collect(),
        legacy: request.legacy,
        tax_percent: request.tax_percent,
        delivery_charge: request.delivery_charge,
        delivery_paid_by_customer: request.delivery_paid_by_customer,
        order_discount: request.order_discount,
        payment_status,
        partial_paid_amount: request.partial_paid_amount,
    })
}

fn legacy_of(order: &order::Model) -> Option<LegacyLine> {
    match (order.selling_price, order.cost_price, order.quantity) {
        (Some(selling_price), Some(cost_price), Some(quantity)) => Some(LegacyLine {
            selling_price,
            cost_price,
            quantity,
        }),
        _ => None,
    }
}

fn validate_line(line: &NewOrderLine) -> Result<(), ServiceError> {
    if line.quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Line quantity must be positive".to_string(),
        ));
    }
    if line.selling_price < Decimal::ZERO
        || line.cost_price < Decimal::ZERO
        || line.discount < Decimal::ZERO
    {
        return Err(ServiceError::ValidationError(
            "Line prices and discounts cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_content(request: &CreateOrder) -> Result<(), ServiceError> {
    if request.lines.is_empty() && request.legacy.is_none() {
        return Err(ServiceError::ValidationError(
            "Order needs product lines or legacy pricing fields".to_string(),
        ));
    }
    for line in &request.lines {
        validate_line(line)?;
    }
    if let Some(legacy) = request.legacy {
        if legacy.quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }
        if legacy.selling_price < Decimal::ZERO || legacy.cost_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Prices cannot be negative".to_string(),
            ));
        }
    }
    if request.tax_percent < Decimal::ZERO
        || request.order_discount < Decimal::ZERO
        || request.delivery_charge < Decimal::ZERO
        || request.partial_paid_amount < Decimal::ZERO
    {
        return Err(ServiceError::ValidationError(
            "Financial configuration values cannot be negative".to_string(),
        ));
    }
    if request.lines.iter().any(|l| l.product_id.is_some()) && request.warehouse_id.is_none() {
        return Err(ServiceError::ValidationError(
            "warehouse_id is required for catalog product lines".to_string(),
        ));
    }
    Ok(())
}

fn is_unique_violation(error: &ServiceError) -> bool {
    match error {
        ServiceError::DatabaseError(db_err) => {
            let text = db_err.to_string();
            text.contains("UNIQUE") || text.contains("unique") || text.contains("duplicate key")
        }
        _ => false,
    }
}
