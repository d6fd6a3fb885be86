//! Monetary arithmetic for checkout.
//!
//! Everything here is pure `rust_decimal` math so it can be unit tested
//! without a database. All amounts are treated as currency with two
//! fractional digits; intermediate shares are truncated (never rounded up)
//! so a buyer is never granted more discount than the coupon carries.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::entities::DiscountType;

/// Fractional digits of a money amount.
pub const MONEY_SCALE: u32 = 2;

/// Smallest representable money unit (one cent).
fn cent() -> Decimal {
    Decimal::new(1, MONEY_SCALE)
}

fn floor_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}

/// Subtotal of a single line at its captured unit price.
pub fn line_subtotal(unit_price: Decimal, quantity: i32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Discount a coupon definition yields on `amount`.
///
/// Returns zero when the amount is below the coupon's minimum order
/// threshold. Percent discounts are truncated to cents; the result is
/// always clamped to `[0, amount]` so a discount can never push an order
/// total negative.
pub fn quote_discount(
    discount_type: &DiscountType,
    discount_value: Decimal,
    min_order_amount: Decimal,
    amount: Decimal,
) -> Decimal {
    if amount <= Decimal::ZERO || amount < min_order_amount {
        return Decimal::ZERO;
    }

    let raw = match discount_type {
        DiscountType::Percent => floor_to_cents(amount * discount_value / Decimal::ONE_HUNDRED),
        DiscountType::Fixed => discount_value,
    };

    raw.max(Decimal::ZERO).min(amount)
}

/// Split a buyer-level discount across per-seller subtotals.
///
/// Largest-remainder apportionment: each subtotal first receives its
/// proportional share truncated to cents, then the leftover cents go to
/// the lines whose truncated fraction was largest (ties resolve in input
/// order, so the result is deterministic). The discount pool is capped at
/// the sum of the subtotals.
///
/// Guarantees, given non-negative cent-scale subtotals:
/// * the returned shares sum to exactly `min(global, total)`,
/// * no share exceeds its subtotal,
/// * no share is negative.
pub fn allocate_discount(global: Decimal, subtotals: &[Decimal]) -> Vec<Decimal> {
    let total: Decimal = subtotals.iter().sum();
    if subtotals.is_empty() || global <= Decimal::ZERO || total <= Decimal::ZERO {
        return vec![Decimal::ZERO; subtotals.len()];
    }

    let pool = floor_to_cents(global.min(total));

    let mut shares = Vec::with_capacity(subtotals.len());
    let mut fractions = Vec::with_capacity(subtotals.len());
    let mut allocated = Decimal::ZERO;
    for (idx, subtotal) in subtotals.iter().enumerate() {
        let exact = pool * *subtotal / total;
        let floored = floor_to_cents(exact);
        allocated += floored;
        shares.push(floored);
        fractions.push((idx, exact - floored));
    }

    let mut leftover = (pool - allocated).max(Decimal::ZERO);
    fractions.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (idx, fraction) in fractions {
        if leftover < cent() {
            break;
        }
        // A positive fraction means the subtotal has at least one more
        // cent of headroom above the floored share.
        if fraction > Decimal::ZERO {
            shares[idx] += cent();
            leftover -= cent();
        }
    }

    shares
}

/// Final amount an order charges: subtotal plus shipping minus discount,
/// floored at zero.
pub fn order_total(subtotal: Decimal, shipping_fee: Decimal, discount: Decimal) -> Decimal {
    (subtotal + shipping_fee - discount).max(Decimal::ZERO)
}
