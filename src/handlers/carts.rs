use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::services::carts::{AddLineInput, CartView};
use crate::{errors::ApiError, AppState};

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/lines", post(add_line))
        .route("/lines/:id", put(update_line).delete(remove_line))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLineRequest {
    pub quantity: i32,
}

/// View the caller's cart
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart contents", body = CartView),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    auth: AuthContext,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let cart = state
        .services
        .carts
        .list(auth.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(cart))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/lines",
    request_body = AddLineInput,
    responses(
        (status = 201, description = "Line added or accumulated"),
        (status = 400, description = "Invalid quantity or unavailable product", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Cart"
)]
pub async fn add_line(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(payload): Json<AddLineInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let line = state
        .services
        .carts
        .add_line(auth.user_id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(line))
}

/// Change a line's quantity
#[utoipa::path(
    put,
    path = "/api/v1/cart/lines/{id}",
    params(("id" = Uuid, Path, description = "Cart line id")),
    request_body = UpdateLineRequest,
    responses(
        (status = 200, description = "Quantity updated"),
        (status = 403, description = "Line belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Cart"
)]
pub async fn update_line(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let line = state
        .services
        .carts
        .update_quantity(auth.user_id, id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(line))
}

/// Remove a line from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/lines/{id}",
    params(("id" = Uuid, Path, description = "Cart line id")),
    responses(
        (status = 204, description = "Line removed"),
        (status = 403, description = "Line belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Line not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Cart"
)]
pub async fn remove_line(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .carts
        .remove_line(auth.user_id, id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    responses(
        (status = 204, description = "Cart emptied")
    ),
    security(("UserIdHeader" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    auth: AuthContext,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .carts
        .clear(auth.user_id)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}
