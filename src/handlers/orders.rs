use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::handlers::common::{
    map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::services::orders::{OrderDetail, OrderView, TransactionGroupDetail, TransitionRequest};
use crate::{errors::ApiError, AppState};

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/selling", get(list_selling_orders))
        .route("/:id", get(get_order))
        .route("/:id/transition", post(transition_order))
}

/// Creates the router for transaction group endpoints
pub fn transaction_groups_routes() -> Router<AppState> {
    Router::new().route("/:id", get(get_transaction_group))
}

/// List the caller's purchases
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = PaginatedResponse<OrderView>)
    ),
    security(("UserIdHeader" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    auth: AuthContext,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let per_page = pagination.per_page(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    let (orders, total) = state
        .services
        .orders
        .list_mine(auth, pagination.page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        per_page,
        total,
    )))
}

/// List orders addressed to the caller as a seller
#[utoipa::path(
    get,
    path = "/api/v1/orders/selling",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = PaginatedResponse<OrderView>),
        (status = 403, description = "Not a seller", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Orders"
)]
pub async fn list_selling_orders(
    auth: AuthContext,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let per_page = pagination.per_page(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    let (orders, total) = state
        .services
        .orders
        .list_selling(auth, pagination.page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        per_page,
        total,
    )))
}

/// Fetch one order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order found", body = OrderDetail),
        (status = 403, description = "Not a party to this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .services
        .orders
        .get(auth, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(detail))
}

/// Move an order to a new status
///
/// Transitions follow the lifecycle: Pending → Shipping/Cancelled,
/// Shipping → Completed, Completed → ReturnRequested, ReturnRequested →
/// Returned/Completed. Cancelled and Returned are final.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/transition",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Order transitioned", body = OrderView),
        (status = 403, description = "Caller may not perform this transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed from current status", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Orders"
)]
pub async fn transition_order(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .transition(auth, id, payload.target)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(OrderView::from(order)))
}

/// Fetch a checkout's transaction group with its orders
#[utoipa::path(
    get,
    path = "/api/v1/transaction-groups/{id}",
    params(("id" = Uuid, Path, description = "Transaction group id")),
    responses(
        (status = 200, description = "Group found", body = TransactionGroupDetail),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Group not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Orders"
)]
pub async fn get_transaction_group(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state
        .services
        .orders
        .get_transaction_group(auth, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(group))
}
