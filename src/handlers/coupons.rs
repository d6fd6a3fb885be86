use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::AuthContext;
use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input,
};
use crate::services::coupons::{CouponQuote, CreateCouponInput, WalletCouponView};
use crate::{errors::ApiError, AppState};

/// Creates the router for coupon endpoints
pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/check", get(check_coupon))
        .route("/wallet", get(list_wallet))
        .route("/:code/claim", post(claim_coupon))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CheckQuery {
    pub code: String,
    /// Order amount to quote the discount against.
    #[param(value_type = String, example = "150.00")]
    pub amount: Decimal,
}

/// Create a master coupon definition
#[utoipa::path(
    post,
    path = "/api/v1/coupons",
    request_body = CreateCouponInput,
    responses(
        (status = 201, description = "Definition created"),
        (status = 400, description = "Invalid definition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a seller or admin", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let coupon = state
        .services
        .coupons
        .create_definition(&auth, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(coupon))
}

/// Claim a coupon code into the caller's wallet
#[utoipa::path(
    post,
    path = "/api/v1/coupons/{code}/claim",
    params(("code" = String, Path, description = "Coupon code")),
    responses(
        (status = 201, description = "Grant added to wallet"),
        (status = 400, description = "Coupon not claimable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Coupons"
)]
pub async fn claim_coupon(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let grant = state
        .services
        .coupons
        .grant(auth.user_id, &code)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(WalletCouponView::from(grant)))
}

/// Quote a coupon against an order amount
#[utoipa::path(
    get,
    path = "/api/v1/coupons/check",
    params(CheckQuery),
    responses(
        (status = 200, description = "Quote computed", body = CouponQuote),
        (status = 404, description = "Unknown code", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn check_coupon(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .services
        .coupons
        .check(&query.code, query.amount)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(quote))
}

/// List the caller's wallet grants
#[utoipa::path(
    get,
    path = "/api/v1/coupons/wallet",
    responses(
        (status = 200, description = "Active grants", body = [WalletCouponView])
    ),
    security(("UserIdHeader" = [])),
    tag = "Coupons"
)]
pub async fn list_wallet(
    auth: AuthContext,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let wallet = state
        .services
        .coupons
        .list_wallet(auth.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(wallet))
}
