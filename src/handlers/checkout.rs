use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};

use crate::auth::AuthContext;
use crate::handlers::common::{created_response, map_service_error};
use crate::services::checkout::{CheckoutOutcome, CheckoutRequest};
use crate::{errors::ApiError, AppState};

/// Creates the router for the checkout endpoint
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/", post(checkout))
}

/// Convert selected cart lines into orders
///
/// Splits the selection into one order per seller under a single
/// transaction group, applies the wallet coupon proportionally, and
/// decrements stock. All-or-nothing: any failure leaves the cart, stock
/// and wallet untouched.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Checkout committed", body = CheckoutOutcome),
        (status = 400, description = "Empty selection or invalid input", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse),
        (status = 403, description = "Foreign cart line or coupon", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart line or coupon not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock or unresolved seller", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Checkout"
)]
pub async fn checkout(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .checkout
        .checkout(auth.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(outcome))
}
