//! Order lifecycle and read surface.
//!
//! Legal transitions: Pending → {Shipping, Cancelled}; Shipping →
//! {Shipping, Completed}; Completed → {ReturnRequested}; ReturnRequested
//! → {Returned, Completed}. Cancelled and Returned are terminal and guard
//! every attempt with `OrderAlreadyFinalized`. Cancelling and accepting a
//! return put the sold units back in stock, and that restock commits in
//! the same transaction as the status change or not at all.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::db::DbPool;
use crate::entities::{
    order, order_line, Order, OrderLine, OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
    TransactionGroup,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::inventory;

/// Order as exposed by the read endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub transaction_group_id: Uuid,
    pub user_id: Uuid,
    pub seller_id: Uuid,
    #[schema(value_type = String, example = "100.00")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "5.00")]
    pub shipping_fee: Decimal,
    #[schema(value_type = String, example = "10.00")]
    pub discount_amount: Decimal,
    #[schema(value_type = String, example = "95.00")]
    pub total_amount: Decimal,
    #[schema(value_type = String, example = "Pending")]
    pub status: OrderStatus,
    #[schema(value_type = String, example = "Cod")]
    pub payment_method: PaymentMethod,
    #[schema(value_type = String, example = "Unpaid")]
    pub payment_status: PaymentStatus,
    pub payment_date: Option<chrono::DateTime<Utc>>,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub shipping_address: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<OrderModel> for OrderView {
    fn from(m: OrderModel) -> Self {
        Self {
            id: m.id,
            transaction_group_id: m.transaction_group_id,
            user_id: m.user_id,
            seller_id: m.seller_id,
            subtotal: m.subtotal,
            shipping_fee: m.shipping_fee,
            discount_amount: m.discount_amount,
            total_amount: m.total_amount,
            status: m.status,
            payment_method: m.payment_method,
            payment_status: m.payment_status,
            payment_date: m.payment_date,
            receiver_name: m.receiver_name,
            receiver_phone: m.receiver_phone,
            shipping_address: m.shipping_address,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// A line within an order detail response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String, example = "49.90")]
    pub unit_price_snapshot: Decimal,
    #[schema(value_type = String, example = "99.80")]
    pub line_subtotal: Decimal,
}

impl From<order_line::Model> for OrderLineView {
    fn from(m: order_line::Model) -> Self {
        let line_subtotal = m.unit_price_snapshot * Decimal::from(m.quantity);
        Self {
            id: m.id,
            product_id: m.product_id,
            quantity: m.quantity,
            unit_price_snapshot: m.unit_price_snapshot,
            line_subtotal,
        }
    }
}

/// Order plus its lines.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderView,
    pub lines: Vec<OrderLineView>,
}

/// Transaction group header plus its child orders.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionGroupDetail {
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(value_type = String, example = "299.70")]
    pub total_amount: Decimal,
    #[schema(value_type = String, example = "Cod")]
    pub payment_method: PaymentMethod,
    #[schema(value_type = String, example = "Unpaid")]
    pub payment_status: PaymentStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub orders: Vec<OrderView>,
}

/// Request body for a status transition.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransitionRequest {
    #[schema(value_type = String, example = "Shipping")]
    pub target: OrderStatus,
}

struct TransitionOutcome {
    order: OrderModel,
    old_status: OrderStatus,
    restocked: Vec<(Uuid, i32)>,
    changed: bool,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Moves an order to `target`, enforcing the transition matrix, the
    /// caller's role, and compensating restocks atomically.
    #[instrument(skip(self), fields(user_id = %auth.user_id))]
    pub async fn transition(
        &self,
        auth: AuthContext,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let result = self
            .db
            .transaction::<_, TransitionOutcome, ServiceError>(move |txn| {
                Box::pin(async move { apply_transition(txn, auth, order_id, target).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::PersistenceFailure(db_err),
                TransactionError::Transaction(service_err) => service_err,
            });

        match result {
            Ok(outcome) => {
                if outcome.changed {
                    metrics::ORDER_TRANSITIONS_TOTAL.inc();
                    self.publish_transition_events(&outcome).await;
                    info!(
                        order_id = %outcome.order.id,
                        from = %outcome.old_status,
                        to = %outcome.order.status,
                        "Order transitioned"
                    );
                }
                Ok(outcome.order)
            }
            Err(err) => {
                metrics::ORDER_TRANSITION_FAILURES_TOTAL.inc();
                Err(err)
            }
        }
    }

    async fn publish_transition_events(&self, outcome: &TransitionOutcome) {
        let order_id = outcome.order.id;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: outcome.old_status.to_string(),
                new_status: outcome.order.status.to_string(),
            })
            .await;

        let specific = match outcome.order.status {
            OrderStatus::Cancelled => Some(Event::OrderCancelled(order_id)),
            OrderStatus::Completed if outcome.old_status == OrderStatus::Shipping => {
                Some(Event::OrderCompleted(order_id))
            }
            OrderStatus::Completed => Some(Event::ReturnRejected(order_id)),
            OrderStatus::ReturnRequested => Some(Event::ReturnRequested(order_id)),
            OrderStatus::Returned => Some(Event::ReturnAccepted(order_id)),
            _ => None,
        };
        if let Some(event) = specific {
            self.event_sender.send_or_log(event).await;
        }

        for (product_id, quantity) in &outcome.restocked {
            self.event_sender
                .send_or_log(Event::StockRestored {
                    product_id: *product_id,
                    quantity: *quantity,
                })
                .await;
        }
    }

    /// Fetches an order with its lines; visible to the buyer, the
    /// seller, and admins.
    #[instrument(skip(self), fields(user_id = %auth.user_id))]
    pub async fn get(&self, auth: AuthContext, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !can_view_order(&auth, &order) {
            return Err(ServiceError::UnauthorizedAccess);
        }

        let lines = OrderLine::find()
            .filter(order_line::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderDetail {
            order: order.into(),
            lines: lines.into_iter().map(OrderLineView::from).collect(),
        })
    }

    /// The caller's purchases, newest first.
    #[instrument(skip(self), fields(user_id = %auth.user_id))]
    pub async fn list_mine(
        &self,
        auth: AuthContext,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        self.list_by(order::Column::UserId, auth.user_id, page, per_page)
            .await
    }

    /// Orders addressed to the caller as a seller, newest first.
    #[instrument(skip(self), fields(user_id = %auth.user_id))]
    pub async fn list_selling(
        &self,
        auth: AuthContext,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        if !auth.is_seller() && !auth.is_admin() {
            return Err(ServiceError::UnauthorizedAccess);
        }
        self.list_by(order::Column::SellerId, auth.user_id, page, per_page)
            .await
    }

    async fn list_by(
        &self,
        column: order::Column,
        id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let paginator = Order::find()
            .filter(column.eq(id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        Ok((rows.into_iter().map(OrderView::from).collect(), total))
    }

    /// A checkout's group header plus every child order; visible to the
    /// buyer who checked out and admins.
    #[instrument(skip(self), fields(user_id = %auth.user_id))]
    pub async fn get_transaction_group(
        &self,
        auth: AuthContext,
        group_id: Uuid,
    ) -> Result<TransactionGroupDetail, ServiceError> {
        let group = TransactionGroup::find_by_id(group_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transaction group {} not found", group_id))
            })?;

        if !auth.owns_or_admin(group.user_id) {
            return Err(ServiceError::UnauthorizedAccess);
        }

        let orders = Order::find()
            .filter(order::Column::TransactionGroupId.eq(group_id))
            .order_by_asc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(TransactionGroupDetail {
            id: group.id,
            user_id: group.user_id,
            total_amount: group.total_amount,
            payment_method: group.payment_method,
            payment_status: group.payment_status,
            created_at: group.created_at,
            orders: orders.into_iter().map(OrderView::from).collect(),
        })
    }
}

fn can_view_order(auth: &AuthContext, order: &OrderModel) -> bool {
    auth.is_admin() || order.user_id == auth.user_id || order.seller_id == auth.user_id
}

/// The transition matrix, applied inside one transaction.
async fn apply_transition(
    txn: &DatabaseTransaction,
    auth: AuthContext,
    order_id: Uuid,
    target: OrderStatus,
) -> Result<TransitionOutcome, ServiceError> {
    let order = Order::find_by_id(order_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    if order.status.is_terminal() {
        return Err(ServiceError::OrderAlreadyFinalized(order.id));
    }

    let from = order.status.clone();

    // Idempotent no-op: a shipping notice for an order already in
    // Shipping neither errors nor touches the row.
    if from == OrderStatus::Shipping && target == OrderStatus::Shipping {
        require_seller(&auth, &order)?;
        return Ok(TransitionOutcome {
            order,
            old_status: from,
            restocked: Vec::new(),
            changed: false,
        });
    }

    let mut restock_lines = false;
    let mut payment_update: Option<(PaymentStatus, Option<chrono::DateTime<Utc>>)> = None;

    match (&from, &target) {
        (OrderStatus::Pending, OrderStatus::Cancelled) => {
            require_party(&auth, &order)?;
            restock_lines = true;
        }
        (OrderStatus::Pending, OrderStatus::Shipping) => {
            require_seller(&auth, &order)?;
        }
        (OrderStatus::Shipping, OrderStatus::Completed) => {
            require_buyer(&auth, &order)?;
            if order.payment_method == PaymentMethod::Cod {
                payment_update = Some((PaymentStatus::Paid, Some(Utc::now())));
            }
        }
        (OrderStatus::Completed, OrderStatus::ReturnRequested) => {
            require_buyer(&auth, &order)?;
        }
        (OrderStatus::ReturnRequested, OrderStatus::Returned) => {
            require_seller(&auth, &order)?;
            restock_lines = true;
            payment_update = Some((PaymentStatus::Refunded, order.payment_date));
        }
        (OrderStatus::ReturnRequested, OrderStatus::Completed) => {
            require_seller(&auth, &order)?;
        }
        _ => {
            return Err(ServiceError::InvalidTransition {
                from: from.clone(),
                to: target,
            });
        }
    }

    let mut restocked = Vec::new();
    if restock_lines {
        let lines = OrderLine::find()
            .filter(order_line::Column::OrderId.eq(order.id))
            .all(txn)
            .await?;
        for line in lines {
            inventory::restock(txn, line.product_id, line.quantity).await?;
            restocked.push((line.product_id, line.quantity));
        }
    }

    let mut active: order::ActiveModel = order.into();
    active.status = Set(target);
    if let Some((payment_status, payment_date)) = payment_update {
        active.payment_status = Set(payment_status);
        active.payment_date = Set(payment_date);
    }
    active.updated_at = Set(Utc::now());
    let updated = active.update(txn).await?;

    Ok(TransitionOutcome {
        order: updated,
        old_status: from,
        restocked,
        changed: true,
    })
}

fn require_buyer(auth: &AuthContext, order: &OrderModel) -> Result<(), ServiceError> {
    if auth.is_admin() || order.user_id == auth.user_id {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedAccess)
    }
}

fn require_seller(auth: &AuthContext, order: &OrderModel) -> Result<(), ServiceError> {
    if auth.is_admin() || (auth.is_seller() && order.seller_id == auth.user_id) {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedAccess)
    }
}

/// Either side of the order, or an admin.
fn require_party(auth: &AuthContext, order: &OrderModel) -> Result<(), ServiceError> {
    if auth.is_admin()
        || order.user_id == auth.user_id
        || (auth.is_seller() && order.seller_id == auth.user_id)
    {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedAccess)
    }
}
