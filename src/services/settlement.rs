//! Pure financial derivation for orders.
//!
//! Everything here is a deterministic function of its inputs: recomputing a
//! settlement from an unchanged order must reproduce identical figures. No
//! database access, no clock reads.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::entities::order::PaymentStatus;

/// One product line as it enters settlement. Prices are unit values; the
/// discount is a flat amount for the whole line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementLine {
    pub selling_price: Decimal,
    pub cost_price: Decimal,
    pub quantity: i32,
    pub discount: Decimal,
}

/// Legacy single-line order content: one selling price, one cost price, one
/// quantity, no per-line discount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LegacyLine {
    pub selling_price: Decimal,
    pub cost_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInput {
    /// Multi-line mode when non-empty; otherwise `legacy` applies.
    pub lines: Vec<SettlementLine>,
    pub legacy: Option<LegacyLine>,
    pub tax_percent: Decimal,
    pub delivery_charge: Decimal,
    pub delivery_paid_by_customer: bool,
    /// Flat currency amount, not a percentage.
    pub order_discount: Decimal,
    pub payment_status: PaymentStatus,
    pub partial_paid_amount: Decimal,
}

/// Computed settlement figures, all rounded at the settlement boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub total_selling: Decimal,
    pub total_cost: Decimal,
    pub total_discount: Decimal,
    pub net_selling: Decimal,
    pub final_amount: Decimal,
    pub profit: Decimal,
    pub partial_remaining_amount: Decimal,
}

/// Rounds to 2 decimal places, half-up away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derives an order's financial figures from its content and configuration.
///
/// Multi-line mode sums `selling_price x quantity` per line but sums unit
/// `cost_price` without the quantity factor; legacy single-line mode likewise
/// takes `cost_price` unmultiplied. Both asymmetries are inherited behavior
/// and preserved as-is.
pub fn compute_settlement(input: &SettlementInput) -> Settlement {
    let mut total_selling = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;
    let mut total_discount = Decimal::ZERO;

    if !input.lines.is_empty() {
        for line in &input.lines {
            let qty = Decimal::from(line.quantity);
            total_selling += line.selling_price * qty;
            total_cost += line.cost_price;
            total_discount += line.discount;
        }
    } else if let Some(legacy) = input.legacy {
        total_selling = legacy.selling_price * Decimal::from(legacy.quantity);
        total_cost = legacy.cost_price;
    }

    total_discount += input.order_discount;

    let net_selling = (total_selling - total_discount).max(Decimal::ZERO);
    let tax_multiplier = Decimal::ONE + input.tax_percent / Decimal::from(100);
    let taxed = net_selling * tax_multiplier;

    let (final_amount, profit) = if input.delivery_paid_by_customer {
        // Delivery is a pass-through: the customer pays it, so it raises the
        // final amount but never enters profit.
        (
            round2(taxed + input.delivery_charge),
            round2(taxed - total_cost),
        )
    } else {
        (
            round2(taxed),
            round2(taxed - total_cost - input.delivery_charge),
        )
    };

    let partial_remaining_amount = if input.payment_status == PaymentStatus::Partial {
        (final_amount - input.partial_paid_amount).max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };

    Settlement {
        total_selling,
        total_cost,
        total_discount,
        net_selling,
        final_amount,
        profit,
        partial_remaining_amount: round2(partial_remaining_amount),
    }
}
