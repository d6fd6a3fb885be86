//! Coupon definitions and the per-buyer wallet.
//!
//! A master definition is the reusable rule (code, type, value, validity
//! window, usage cap). A wallet coupon is a grant materialized from a
//! Fixed master: the amount is frozen at claim time, which is why Percent
//! masters can be quoted but never granted. Redemption-time mutations
//! (deactivating the grant, spending a master use, writing audit rows)
//! run inside the checkout transaction, so those helpers are generic over
//! the connection like the stock primitives.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthContext;
use crate::db::DbPool;
use crate::entities::{
    coupon, wallet_coupon, Coupon, CouponModel, DiscountType, WalletCoupon, WalletCouponModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pricing;

/// Parameters for creating a master coupon definition.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[schema(value_type = String, example = "Fixed")]
    pub discount_type: DiscountType,
    #[schema(value_type = String, example = "10.00")]
    pub discount_value: Decimal,
    #[serde(default)]
    #[schema(value_type = String, example = "0")]
    pub min_order_amount: Decimal,
    pub valid_from: chrono::DateTime<Utc>,
    pub valid_to: chrono::DateTime<Utc>,
    pub remaining_uses: i32,
    /// Admins may issue on behalf of a seller or leave unset for a
    /// platform-wide coupon. Ignored for seller callers.
    pub seller_id: Option<Uuid>,
}

/// Result of quoting a coupon code against an order amount.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CouponQuote {
    pub code: String,
    /// Whether the master passes its gates (active, in window, uses left).
    pub eligible: bool,
    /// Discount the coupon would yield; zero when ineligible or below the
    /// minimum order amount.
    #[schema(value_type = String, example = "10.00")]
    pub discount: Decimal,
    pub reason: Option<String>,
}

/// A wallet grant as shown to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletCouponView {
    pub id: Uuid,
    pub code: String,
    #[schema(value_type = String, example = "10.00")]
    pub discount_amount: Decimal,
    pub granted_at: chrono::DateTime<Utc>,
}

impl From<WalletCouponModel> for WalletCouponView {
    fn from(model: WalletCouponModel) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount_amount: model.discount_amount,
            granted_at: model.granted_at,
        }
    }
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a master coupon definition.
    ///
    /// Sellers always issue under their own id; admins may issue for a
    /// seller or platform-wide.
    #[instrument(skip(self, auth))]
    pub async fn create_definition(
        &self,
        auth: &AuthContext,
        input: CreateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        if !auth.is_seller() && !auth.is_admin() {
            return Err(ServiceError::UnauthorizedAccess);
        }
        if input.discount_value <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount value must be positive".to_string(),
            ));
        }
        if input.discount_type == DiscountType::Percent
            && input.discount_value > Decimal::ONE_HUNDRED
        {
            return Err(ServiceError::ValidationError(
                "Percent discount cannot exceed 100".to_string(),
            ));
        }
        if input.min_order_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Minimum order amount cannot be negative".to_string(),
            ));
        }
        if input.valid_from >= input.valid_to {
            return Err(ServiceError::ValidationError(
                "Validity window must end after it starts".to_string(),
            ));
        }
        if input.remaining_uses < 0 {
            return Err(ServiceError::ValidationError(
                "Remaining uses cannot be negative".to_string(),
            ));
        }

        let existing = Coupon::find()
            .filter(coupon::Column::Code.eq(input.code.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Coupon code {} already exists",
                input.code
            )));
        }

        let seller_id = if auth.is_admin() {
            input.seller_id
        } else {
            Some(auth.user_id)
        };

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(input.code.clone()),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            min_order_amount: Set(input.min_order_amount),
            valid_from: Set(input.valid_from),
            valid_to: Set(input.valid_to),
            remaining_uses: Set(input.remaining_uses),
            seller_id: Set(seller_id),
            active: Set(true),
            created_at: Set(Utc::now()),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CouponDefined(created.id))
            .await;

        info!(coupon_id = %created.id, code = %created.code, "Created coupon definition");
        Ok(created)
    }

    /// Claims a coupon code into the caller's wallet.
    ///
    /// Only Fixed masters can be granted; the grant copies the master's
    /// discount value and from then on lives independently of it. A user
    /// holds at most one active grant per code.
    #[instrument(skip(self))]
    pub async fn grant(&self, user_id: Uuid, code: &str) -> Result<WalletCouponModel, ServiceError> {
        let master = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CouponNotFound)?;

        if let Some(reason) = master_gate(&master) {
            return Err(ServiceError::ValidationError(reason));
        }
        if master.discount_type != DiscountType::Fixed {
            return Err(ServiceError::ValidationError(
                "Only fixed-amount coupons can be claimed into a wallet".to_string(),
            ));
        }

        let already_held = WalletCoupon::find()
            .filter(wallet_coupon::Column::UserId.eq(user_id))
            .filter(wallet_coupon::Column::Code.eq(code))
            .filter(wallet_coupon::Column::Active.eq(true))
            .one(&*self.db)
            .await?;
        if already_held.is_some() {
            return Err(ServiceError::ValidationError(
                "Coupon already claimed".to_string(),
            ));
        }

        let model = wallet_coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            code: Set(master.code.clone()),
            discount_amount: Set(master.discount_value),
            active: Set(true),
            granted_at: Set(Utc::now()),
        };
        let granted = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CouponGranted {
                user_id,
                code: master.code.clone(),
            })
            .await;

        info!(user_id = %user_id, code = %master.code, "Granted wallet coupon");
        Ok(granted)
    }

    /// Quotes what a coupon code would take off a given order amount.
    #[instrument(skip(self))]
    pub async fn check(&self, code: &str, order_amount: Decimal) -> Result<CouponQuote, ServiceError> {
        let master = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CouponNotFound)?;

        if let Some(reason) = master_gate(&master) {
            return Ok(CouponQuote {
                code: master.code,
                eligible: false,
                discount: Decimal::ZERO,
                reason: Some(reason),
            });
        }

        let discount = pricing::quote_discount(
            &master.discount_type,
            master.discount_value,
            master.min_order_amount,
            order_amount,
        );
        let reason = if discount.is_zero() {
            Some(format!(
                "Order amount below minimum of {}",
                master.min_order_amount
            ))
        } else {
            None
        };

        Ok(CouponQuote {
            code: master.code,
            eligible: true,
            discount,
            reason,
        })
    }

    /// Lists the caller's active wallet grants, newest first.
    #[instrument(skip(self))]
    pub async fn list_wallet(&self, user_id: Uuid) -> Result<Vec<WalletCouponView>, ServiceError> {
        let grants = WalletCoupon::find()
            .filter(wallet_coupon::Column::UserId.eq(user_id))
            .filter(wallet_coupon::Column::Active.eq(true))
            .order_by_desc(wallet_coupon::Column::GrantedAt)
            .all(&*self.db)
            .await?;

        Ok(grants.into_iter().map(WalletCouponView::from).collect())
    }
}

/// Returns the reason a master fails its gates, or `None` when usable.
fn master_gate(master: &CouponModel) -> Option<String> {
    let now = Utc::now();
    if !master.active {
        return Some("Coupon is no longer active".to_string());
    }
    if now < master.valid_from {
        return Some("Coupon is not yet valid".to_string());
    }
    if now > master.valid_to {
        return Some("Coupon has expired".to_string());
    }
    if master.remaining_uses <= 0 {
        return Some("Coupon has been fully redeemed".to_string());
    }
    None
}

/// Loads a wallet grant for redemption by its owner.
///
/// A grant that does not exist or was already used maps to
/// [`ServiceError::CouponNotFound`]; someone else's grant maps to
/// [`ServiceError::CouponNotOwned`].
pub async fn load_grant_for_redemption<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    wallet_coupon_id: Uuid,
) -> Result<WalletCouponModel, ServiceError> {
    let grant = WalletCoupon::find_by_id(wallet_coupon_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::CouponNotFound)?;

    if grant.user_id != user_id {
        return Err(ServiceError::CouponNotOwned);
    }
    if !grant.active {
        return Err(ServiceError::CouponNotFound);
    }
    Ok(grant)
}

/// Deactivates a grant after it has been applied to a checkout.
pub async fn consume_grant<C: ConnectionTrait>(
    conn: &C,
    grant: WalletCouponModel,
) -> Result<(), ServiceError> {
    let mut active: wallet_coupon::ActiveModel = grant.into();
    active.active = Set(false);
    active.update(conn).await?;
    Ok(())
}

/// Resolves the master definition behind a grant's code.
///
/// Grants outlive their masters: a missing or lapsed master does not
/// invalidate the grant, it only means no audit row can reference it.
pub async fn resolve_master<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<CouponModel>, ServiceError> {
    let master = Coupon::find()
        .filter(coupon::Column::Code.eq(code))
        .one(conn)
        .await?;
    if master.is_none() {
        warn!(code = %code, "Wallet coupon has no master definition");
    }
    Ok(master)
}

/// Spends one use of a master definition, never driving the counter
/// negative.
pub async fn spend_master_use<C: ConnectionTrait>(
    conn: &C,
    master_id: Uuid,
) -> Result<(), ServiceError> {
    let result = Coupon::update_many()
        .col_expr(
            coupon::Column::RemainingUses,
            Expr::col(coupon::Column::RemainingUses).sub(1),
        )
        .filter(coupon::Column::Id.eq(master_id))
        .filter(coupon::Column::RemainingUses.gt(0))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        debug!(coupon_id = %master_id, "Master coupon already at zero uses");
    }
    Ok(())
}
