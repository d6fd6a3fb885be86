//! Per-buyer shopping cart.
//!
//! A cart is just the set of `cart_lines` rows owned by a user; there is no
//! separate cart header. Lines capture the product's price at the moment
//! they are added (`unit_price_snapshot`) and keep that price until
//! checkout consumes them, so a seller editing a listing never silently
//! changes what a buyer agreed to pay. Stock checks here are advisory; the
//! binding check is the conditional decrement inside checkout.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{cart_line, CartLine, CartLineModel, Product, ProductStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing;

/// Parameters for adding a product to the cart.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AddLineInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// A cart line joined with its product, as shown to the buyer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub seller_id: Option<Uuid>,
    pub quantity: i32,
    #[schema(value_type = String, example = "49.90")]
    pub unit_price_snapshot: Decimal,
    #[schema(value_type = String, example = "99.80")]
    pub line_subtotal: Decimal,
    /// False when the listing was suspended or deleted after the line was
    /// added; such lines fail checkout.
    pub available: bool,
}

/// Cart contents plus the sum of line subtotals.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    #[schema(value_type = String, example = "149.70")]
    pub subtotal: Decimal,
}

#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds a product to the buyer's cart, accumulating quantity when a
    /// line for that product already exists.
    ///
    /// The price snapshot is taken on first add and deliberately not
    /// refreshed on accumulation. Buyers cannot add their own listings.
    #[instrument(skip(self))]
    pub async fn add_line(
        &self,
        user_id: Uuid,
        input: AddLineInput,
    ) -> Result<CartLineModel, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let product = Product::find_by_id(input.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if product.status != ProductStatus::Active {
            return Err(ServiceError::ValidationError(
                "Product is not available for purchase".to_string(),
            ));
        }
        if product.seller_id == Some(user_id) {
            return Err(ServiceError::ValidationError(
                "You cannot purchase your own listing".to_string(),
            ));
        }

        let existing = CartLine::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .filter(cart_line::Column::ProductId.eq(input.product_id))
            .one(&*self.db)
            .await?;

        let requested = existing.as_ref().map_or(0, |l| l.quantity) + input.quantity;
        if requested > product.stock_quantity {
            return Err(ServiceError::InsufficientStock {
                product_id: product.id,
                available: product.stock_quantity,
            });
        }

        let line = match existing {
            Some(line) => {
                let mut active: cart_line::ActiveModel = line.into();
                active.quantity = Set(requested);
                active.update(&*self.db).await?
            }
            None => {
                let model = cart_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(input.product_id),
                    quantity: Set(input.quantity),
                    unit_price_snapshot: Set(product.price),
                    created_at: Set(Utc::now()),
                };
                model.insert(&*self.db).await?
            }
        };

        self.event_sender
            .send_or_log(Event::CartLineAdded {
                user_id,
                product_id: input.product_id,
            })
            .await;

        info!(
            user_id = %user_id,
            product_id = %input.product_id,
            quantity = input.quantity,
            "Added cart line"
        );
        Ok(line)
    }

    /// Replaces the quantity of an existing line.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<CartLineModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let line = self.owned_line(user_id, line_id).await?;

        let product = Product::find_by_id(line.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
        if quantity > product.stock_quantity {
            return Err(ServiceError::InsufficientStock {
                product_id: product.id,
                available: product.stock_quantity,
            });
        }

        let mut active: cart_line::ActiveModel = line.into();
        active.quantity = Set(quantity);
        let updated = active.update(&*self.db).await?;

        Ok(updated)
    }

    /// Removes one line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, user_id: Uuid, line_id: Uuid) -> Result<(), ServiceError> {
        let line = self.owned_line(user_id, line_id).await?;
        let product_id = line.product_id;
        line.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartLineRemoved { user_id, line_id })
            .await;

        info!(user_id = %user_id, product_id = %product_id, "Removed cart line");
        Ok(())
    }

    /// Empties the buyer's cart.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartLine::delete_many()
            .filter(cart_line::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::CartCleared(user_id))
                .await;
        }

        Ok(result.rows_affected)
    }

    /// Returns the cart joined with product details, oldest line first.
    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let rows = CartLine::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .order_by_asc(cart_line::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(rows.len());
        let mut subtotal = Decimal::ZERO;
        for (line, product) in rows {
            let line_subtotal = pricing::line_subtotal(line.unit_price_snapshot, line.quantity);
            subtotal += line_subtotal;
            let (product_name, seller_id, available) = match product {
                Some(p) => {
                    let available =
                        p.status == ProductStatus::Active && p.stock_quantity >= line.quantity;
                    (p.name, p.seller_id, available)
                }
                None => ("(removed listing)".to_string(), None, false),
            };
            lines.push(CartLineView {
                id: line.id,
                product_id: line.product_id,
                product_name,
                seller_id,
                quantity: line.quantity,
                unit_price_snapshot: line.unit_price_snapshot,
                line_subtotal,
                available,
            });
        }

        Ok(CartView { lines, subtotal })
    }

    async fn owned_line(&self, user_id: Uuid, line_id: Uuid) -> Result<CartLineModel, ServiceError> {
        let line = CartLine::find_by_id(line_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart line {} not found", line_id)))?;
        if line.user_id != user_id {
            return Err(ServiceError::UnauthorizedAccess);
        }
        Ok(line)
    }
}
