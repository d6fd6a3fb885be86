//! Stock movement primitives.
//!
//! Checkout and the order lifecycle both adjust `products.stock_quantity`
//! inside a surrounding database transaction, so these helpers are generic
//! over the connection and never open transactions of their own. The
//! decrement is a single conditional `UPDATE`, which is what keeps two
//! concurrent checkouts from overselling the same unit.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::warn;
use uuid::Uuid;

use crate::entities::{product, Product};
use crate::errors::ServiceError;

/// Takes `quantity` units out of a product's stock.
///
/// Issues `UPDATE products SET stock_quantity = stock_quantity - q WHERE id
/// = ? AND stock_quantity >= q`; when no row matches, the product either
/// does not exist or has too few units left, and the current availability is
/// re-read to report an accurate [`ServiceError::InsufficientStock`].
pub async fn take_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::StockQuantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let available = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .map(|p| p.stock_quantity)
            .unwrap_or(0);
        warn!(
            product_id = %product_id,
            requested = quantity,
            available,
            "Stock decrement rejected"
        );
        return Err(ServiceError::InsufficientStock {
            product_id,
            available,
        });
    }

    Ok(())
}

/// Returns `quantity` units to a product's stock.
///
/// Used when an order is cancelled or a return is accepted. A vanished
/// product row is logged rather than surfaced; the surrounding status
/// change must still go through.
pub async fn restock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Ok(());
    }

    let result = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(product_id = %product_id, quantity, "Restock target no longer exists");
    }

    Ok(())
}
