//! The checkout engine.
//!
//! Converts a buyer's selected cart lines into one transaction group plus
//! one order per seller, inside a single database transaction. Everything
//! mutating happens against the transaction handle, so any error on the
//! way out rolls the whole attempt back: no orders without stock, no
//! stock taken without orders, no coupon burned without a committed
//! group.
//!
//! The one true concurrency hazard is two checkouts racing for the last
//! units of a product; that is settled by the conditional decrement in
//! [`inventory::take_stock`], not by anything here.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{
    cart_line, coupon_usage, order, order_line, product, transaction_group, CartLine,
    CartLineModel, CouponModel, OrderStatus, PaymentMethod, PaymentStatus, Product, ProductModel,
    ProductStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::{coupons, inventory, pricing};

/// Checkout parameters submitted by the buyer.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    /// Cart lines to purchase; duplicates are collapsed.
    pub selected_line_ids: Vec<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub receiver_name: String,
    #[validate(length(min = 1, max = 32))]
    pub receiver_phone: String,
    #[validate(length(min = 1, max = 500))]
    pub shipping_address: String,
    #[schema(value_type = String, example = "Cod")]
    pub payment_method: PaymentMethod,
    /// Optional wallet grant to apply across the whole checkout.
    pub wallet_coupon_id: Option<Uuid>,
}

/// What a committed checkout produced.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutOutcome {
    pub transaction_group_id: Uuid,
    /// One order per seller, in deterministic seller order.
    pub order_ids: Vec<Uuid>,
    #[schema(value_type = String, example = "299.70")]
    pub total_amount: Decimal,
}

/// One seller's slice of the checkout, assembled before any insert.
struct SellerGroup {
    seller_id: Uuid,
    lines: Vec<CartLineModel>,
    subtotal: Decimal,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    shipping_fee: Decimal,
}

impl CheckoutService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, shipping_fee: Decimal) -> Self {
        Self {
            db,
            event_sender,
            shipping_fee,
        }
    }

    /// Runs the full checkout.
    ///
    /// On success the cart lines are gone, stock is decremented, the
    /// wallet grant (if any) is spent and one `Pending` order per seller
    /// exists under a fresh transaction group. On any failure nothing
    /// changed.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        if let Err(e) = request.validate() {
            metrics::CHECKOUT_FAILURES_TOTAL.inc();
            return Err(e.into());
        }
        if request.selected_line_ids.is_empty() {
            metrics::CHECKOUT_FAILURES_TOTAL.inc();
            return Err(ServiceError::EmptySelection);
        }

        let result = self.run_transaction(user_id, &request).await;

        match result {
            Ok((outcome, redeemed_grant)) => {
                metrics::CHECKOUTS_TOTAL.inc();
                metrics::ORDERS_CREATED_TOTAL.inc_by(outcome.order_ids.len() as u64);

                self.event_sender
                    .send_or_log(Event::CheckoutCompleted {
                        transaction_group_id: outcome.transaction_group_id,
                        user_id,
                        order_count: outcome.order_ids.len(),
                    })
                    .await;
                for order_id in &outcome.order_ids {
                    self.event_sender
                        .send_or_log(Event::OrderCreated(*order_id))
                        .await;
                }
                if let Some(grant_id) = redeemed_grant {
                    self.event_sender
                        .send_or_log(Event::CouponRedeemed {
                            wallet_coupon_id: grant_id,
                            transaction_group_id: outcome.transaction_group_id,
                            applied_at: Utc::now(),
                        })
                        .await;
                }

                info!(
                    user_id = %user_id,
                    transaction_group_id = %outcome.transaction_group_id,
                    orders = outcome.order_ids.len(),
                    total = %outcome.total_amount,
                    "Checkout committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                metrics::CHECKOUT_FAILURES_TOTAL.inc();
                Err(err)
            }
        }
    }

    async fn run_transaction(
        &self,
        user_id: Uuid,
        request: &CheckoutRequest,
    ) -> Result<(CheckoutOutcome, Option<Uuid>), ServiceError> {
        let txn = self.db.begin().await?;

        let lines = self
            .load_selected_lines(&txn, user_id, &request.selected_line_ids)
            .await?;

        let grant = match request.wallet_coupon_id {
            Some(grant_id) => {
                Some(coupons::load_grant_for_redemption(&txn, user_id, grant_id).await?)
            }
            None => None,
        };

        let products = self.load_products(&txn, &lines).await?;
        let groups = build_seller_groups(lines, &products)?;

        let global_discount = grant
            .as_ref()
            .map(|g| g.discount_amount)
            .unwrap_or(Decimal::ZERO);
        let subtotals: Vec<Decimal> = groups.iter().map(|g| g.subtotal).collect();
        let shares = pricing::allocate_discount(global_discount, &subtotals);

        let master = match grant.as_ref() {
            Some(g) => {
                let master = coupons::resolve_master(&txn, &g.code).await?;
                if let Some(m) = &master {
                    if m.remaining_uses <= 0 || !m.active || Utc::now() > m.valid_to {
                        warn!(
                            code = %g.code,
                            "Honoring wallet grant whose master definition has lapsed"
                        );
                    }
                }
                master
            }
            None => None,
        };

        let now = Utc::now();
        let group_id = Uuid::new_v4();
        transaction_group::ActiveModel {
            id: Set(group_id),
            user_id: Set(user_id),
            total_amount: Set(Decimal::ZERO),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(PaymentStatus::Unpaid),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut order_ids = Vec::with_capacity(groups.len());
        let mut grand_total = Decimal::ZERO;
        for (group, share) in groups.iter().zip(shares.iter()) {
            let (order_id, order_total) = self
                .create_order_for_group(&txn, user_id, group_id, request, group, *share, &master, now)
                .await?;
            order_ids.push(order_id);
            grand_total += order_total;
        }

        let group_update = transaction_group::ActiveModel {
            id: Set(group_id),
            total_amount: Set(grand_total),
            ..Default::default()
        };
        group_update.update(&txn).await?;

        let consumed: Vec<Uuid> = groups
            .iter()
            .flat_map(|g| g.lines.iter().map(|l| l.id))
            .collect();
        CartLine::delete_many()
            .filter(cart_line::Column::Id.is_in(consumed))
            .exec(&txn)
            .await?;

        let redeemed_grant = match grant {
            Some(g) => {
                let grant_id = g.id;
                coupons::consume_grant(&txn, g).await?;
                if let Some(m) = &master {
                    coupons::spend_master_use(&txn, m.id).await?;
                }
                Some(grant_id)
            }
            None => None,
        };

        txn.commit().await?;

        Ok((
            CheckoutOutcome {
                transaction_group_id: group_id,
                order_ids,
                total_amount: grand_total,
            },
            redeemed_grant,
        ))
    }

    /// Loads the selected lines and enforces ownership.
    ///
    /// A line owned by another user rejects the whole call; a missing id
    /// is `NotFound` unless nothing resolved at all, which reads as an
    /// empty selection.
    async fn load_selected_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        requested: &[Uuid],
    ) -> Result<Vec<CartLineModel>, ServiceError> {
        let mut selected: Vec<Uuid> = Vec::with_capacity(requested.len());
        for id in requested {
            if !selected.contains(id) {
                selected.push(*id);
            }
        }

        let lines = CartLine::find()
            .filter(cart_line::Column::Id.is_in(selected.clone()))
            .all(conn)
            .await?;

        if let Some(foreign) = lines.iter().find(|l| l.user_id != user_id) {
            warn!(
                user_id = %user_id,
                line_id = %foreign.id,
                "Checkout selected a cart line owned by another user"
            );
            return Err(ServiceError::UnauthorizedAccess);
        }
        if lines.is_empty() {
            return Err(ServiceError::EmptySelection);
        }
        if lines.len() != selected.len() {
            let found: HashSet<Uuid> = lines.iter().map(|l| l.id).collect();
            let missing = selected
                .iter()
                .find(|id| !found.contains(id))
                .copied()
                .unwrap_or_default();
            return Err(ServiceError::NotFound(format!(
                "Cart line {} not found",
                missing
            )));
        }
        if let Some(bad) = lines.iter().find(|l| l.quantity < 1) {
            return Err(ServiceError::ValidationError(format!(
                "Cart line {} has an invalid quantity",
                bad.id
            )));
        }

        Ok(lines)
    }

    /// Re-reads each line's product inside the transaction.
    async fn load_products<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[CartLineModel],
    ) -> Result<HashMap<Uuid, ProductModel>, ServiceError> {
        let product_ids: HashSet<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let rows = Product::find()
            .filter(product::Column::Id.is_in(product_ids.into_iter().collect::<Vec<_>>()))
            .all(conn)
            .await?;
        let by_id: HashMap<Uuid, ProductModel> = rows.into_iter().map(|p| (p.id, p)).collect();

        for line in lines {
            let product = by_id.get(&line.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
            if product.status != ProductStatus::Active {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is no longer available",
                    product.id
                )));
            }
        }

        Ok(by_id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_order_for_group<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Uuid,
        group_id: Uuid,
        request: &CheckoutRequest,
        group: &SellerGroup,
        discount: Decimal,
        master: &Option<CouponModel>,
        now: chrono::DateTime<Utc>,
    ) -> Result<(Uuid, Decimal), ServiceError> {
        let order_id = Uuid::new_v4();
        let total = pricing::order_total(group.subtotal, self.shipping_fee, discount);

        order::ActiveModel {
            id: Set(order_id),
            transaction_group_id: Set(group_id),
            user_id: Set(user_id),
            seller_id: Set(group.seller_id),
            subtotal: Set(group.subtotal),
            shipping_fee: Set(self.shipping_fee),
            discount_amount: Set(discount),
            total_amount: Set(total),
            status: Set(OrderStatus::Pending),
            payment_method: Set(request.payment_method.clone()),
            payment_status: Set(PaymentStatus::Unpaid),
            payment_date: Set(None),
            receiver_name: Set(request.receiver_name.clone()),
            receiver_phone: Set(request.receiver_phone.clone()),
            shipping_address: Set(request.shipping_address.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;

        for line in &group.lines {
            order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price_snapshot: Set(line.unit_price_snapshot),
            }
            .insert(conn)
            .await?;

            inventory::take_stock(conn, line.product_id, line.quantity).await?;
        }

        if discount > Decimal::ZERO {
            if let Some(m) = master {
                coupon_usage::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    coupon_id: Set(m.id),
                    user_id: Set(user_id),
                    order_id: Set(order_id),
                    transaction_group_id: Set(group_id),
                    applied_amount: Set(discount),
                    used_at: Set(now),
                }
                .insert(conn)
                .await?;
            }
        }

        Ok((order_id, total))
    }
}

/// Groups lines by seller with subtotals, keyed deterministically.
///
/// A product without a seller is a data fault the buyer cannot fix;
/// surfacing it beats silently dropping the line's value.
fn build_seller_groups(
    lines: Vec<CartLineModel>,
    products: &HashMap<Uuid, ProductModel>,
) -> Result<Vec<SellerGroup>, ServiceError> {
    let mut by_seller: BTreeMap<Uuid, Vec<CartLineModel>> = BTreeMap::new();
    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", line.product_id)))?;
        let seller_id = product
            .seller_id
            .ok_or(ServiceError::SellerUnresolved(product.id))?;
        by_seller.entry(seller_id).or_default().push(line);
    }

    Ok(by_seller
        .into_iter()
        .map(|(seller_id, lines)| {
            let subtotal = lines
                .iter()
                .map(|l| pricing::line_subtotal(l.unit_price_snapshot, l.quantity))
                .sum();
            SellerGroup {
                seller_id,
                lines,
                subtotal,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(user: Uuid, product: Uuid, qty: i32, price: Decimal) -> CartLineModel {
        CartLineModel {
            id: Uuid::new_v4(),
            user_id: user,
            product_id: product,
            quantity: qty,
            unit_price_snapshot: price,
            created_at: Utc::now(),
        }
    }

    fn listing(id: Uuid, seller: Option<Uuid>) -> ProductModel {
        ProductModel {
            id,
            seller_id: seller,
            name: "Camera".to_string(),
            price: dec!(100),
            stock_quantity: 10,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_groups_split_by_seller_with_subtotals() {
        let buyer = Uuid::new_v4();
        let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (prod_a, prod_b, prod_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut products = HashMap::new();
        products.insert(prod_a, listing(prod_a, Some(seller_a)));
        products.insert(prod_b, listing(prod_b, Some(seller_a)));
        products.insert(prod_c, listing(prod_c, Some(seller_b)));

        let lines = vec![
            line(buyer, prod_a, 1, dec!(40)),
            line(buyer, prod_b, 2, dec!(30)),
            line(buyer, prod_c, 1, dec!(200)),
        ];

        let groups = build_seller_groups(lines, &products).unwrap();
        assert_eq!(groups.len(), 2);

        let total: Decimal = groups.iter().map(|g| g.subtotal).sum();
        assert_eq!(total, dec!(300));

        let by_seller: HashMap<Uuid, Decimal> =
            groups.iter().map(|g| (g.seller_id, g.subtotal)).collect();
        assert_eq!(by_seller[&seller_a], dec!(100));
        assert_eq!(by_seller[&seller_b], dec!(200));
    }

    #[test]
    fn test_groups_reject_sellerless_product() {
        let buyer = Uuid::new_v4();
        let orphan = Uuid::new_v4();
        let mut products = HashMap::new();
        products.insert(orphan, listing(orphan, None));

        let result = build_seller_groups(vec![line(buyer, orphan, 1, dec!(10))], &products);
        assert!(matches!(
            result,
            Err(ServiceError::SellerUnresolved(id)) if id == orphan
        ));
    }
}
