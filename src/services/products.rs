//! Product listings: the catalog side of the marketplace.
//!
//! Listings are created by sellers and never deleted; taking one off the
//! market means suspending it, which keeps historical order lines pointing
//! at a real row. Stock changes from the seller surface go through
//! [`set_stock`](ProductService::set_stock); checkout and lifecycle
//! restocks use the primitives in [`super::inventory`] instead.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthContext;
use crate::db::DbPool;
use crate::entities::{product, Product, ProductModel, ProductStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Parameters for creating a listing.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Unit price; must be positive.
    #[schema(value_type = String, example = "49.90")]
    pub price: Decimal,
    /// Units available for sale; zero is allowed for a sold-out listing.
    pub stock_quantity: i32,
    /// Admins may create listings on behalf of a seller, or leave this
    /// unset for platform-owned rows. Ignored for seller callers.
    pub seller_id: Option<Uuid>,
}

/// Filters for listing the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub seller_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
}

/// Catalog service: listing creation, lookup and seller stock management.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a listing owned by the calling seller.
    ///
    /// Sellers always own what they create; admins may assign another
    /// seller or leave the listing unowned.
    #[instrument(skip(self, auth))]
    pub async fn create(
        &self,
        auth: &AuthContext,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        if !auth.is_seller() && !auth.is_admin() {
            return Err(ServiceError::UnauthorizedAccess);
        }
        if input.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price must be positive".to_string(),
            ));
        }
        if input.stock_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Stock quantity cannot be negative".to_string(),
            ));
        }

        let seller_id = if auth.is_admin() {
            input.seller_id
        } else {
            Some(auth.user_id)
        };

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            seller_id: Set(seller_id),
            name: Set(input.name.clone()),
            price: Set(input.price),
            stock_quantity: Set(input.stock_quantity),
            status: Set(ProductStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        info!(product_id = %created.id, "Created product listing");
        Ok(created)
    }

    /// Fetches a single listing.
    #[instrument(skip(self))]
    pub async fn get(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Lists the catalog, newest first, with optional seller and status
    /// filters. Returns the page of rows plus the total match count.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ProductFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(seller_id) = filter.seller_id {
            query = query.filter(product::Column::SellerId.eq(seller_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(product::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        Ok((rows, total))
    }

    /// Sets the absolute stock level of a listing.
    ///
    /// Only the owning seller or an admin may do this.
    #[instrument(skip(self, auth))]
    pub async fn set_stock(
        &self,
        auth: &AuthContext,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<ProductModel, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Stock quantity cannot be negative".to_string(),
            ));
        }

        let listing = self.get(product_id).await?;
        self.ensure_can_manage(auth, &listing)?;

        let mut active: product::ActiveModel = listing.into();
        active.stock_quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(product_id = %product_id, quantity, "Set product stock");
        Ok(updated)
    }

    /// Takes a listing off the market. Existing orders are unaffected;
    /// suspended listings reject cart adds and checkout.
    #[instrument(skip(self, auth))]
    pub async fn suspend(
        &self,
        auth: &AuthContext,
        product_id: Uuid,
    ) -> Result<ProductModel, ServiceError> {
        let listing = self.get(product_id).await?;
        self.ensure_can_manage(auth, &listing)?;

        if listing.status == ProductStatus::Suspended {
            return Ok(listing);
        }

        let mut active: product::ActiveModel = listing.into();
        active.status = Set(ProductStatus::Suspended);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductSuspended(product_id))
            .await;

        info!(product_id = %product_id, "Suspended product listing");
        Ok(updated)
    }

    fn ensure_can_manage(
        &self,
        auth: &AuthContext,
        listing: &ProductModel,
    ) -> Result<(), ServiceError> {
        if auth.is_admin() {
            return Ok(());
        }
        if listing.seller_id == Some(auth.user_id) {
            return Ok(());
        }
        Err(ServiceError::UnauthorizedAccess)
    }
}

/// Listing as returned by the read endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub seller_id: Option<Uuid>,
    pub name: String,
    #[schema(value_type = String, example = "49.90")]
    pub price: Decimal,
    pub stock_quantity: i32,
    #[schema(value_type = String, example = "Active")]
    pub status: ProductStatus,
}

impl From<ProductModel> for ProductSummary {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            seller_id: model.seller_id,
            name: model.name,
            price: model.price,
            stock_quantity: model.stock_quantity,
            status: model.status,
        }
    }
}
