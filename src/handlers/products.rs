use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::entities::ProductStatus;
use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::services::products::{CreateProductInput, ProductFilter, ProductSummary};
use crate::{errors::ApiError, AppState};

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product))
        .route("/:id/stock", put(set_stock))
        .route("/:id/suspend", post(suspend_product))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: PaginationParams,
    pub seller_id: Option<Uuid>,
    #[param(value_type = Option<String>, example = "Active")]
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStockRequest {
    pub quantity: i32,
}

/// Create a product listing
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductInput,
    responses(
        (status = 201, description = "Listing created", body = ProductSummary),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthenticated", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a seller", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Products"
)]
pub async fn create_product(
    auth: AuthContext,
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let product = state
        .services
        .products
        .create(&auth, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(ProductSummary::from(product)))
}

/// List the catalog
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("per_page" = Option<u64>, Query, description = "Items per page"),
        ("seller_id" = Option<Uuid>, Query, description = "Filter by seller"),
        ("status" = Option<String>, Query, description = "Filter by listing status"),
    ),
    responses(
        (status = 200, description = "Listings retrieved", body = PaginatedResponse<ProductSummary>),
        (status = 400, description = "Invalid parameters", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let per_page = query.pagination.per_page(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    );
    let filter = ProductFilter {
        seller_id: query.seller_id,
        status: query.status,
    };
    let (rows, total) = state
        .services
        .products
        .list(filter, query.pagination.page, per_page)
        .await
        .map_err(map_service_error)?;

    let data: Vec<ProductSummary> = rows.into_iter().map(ProductSummary::from).collect();
    Ok(success_response(PaginatedResponse::new(
        data,
        query.pagination.page,
        per_page,
        total,
    )))
}

/// Fetch one listing
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Listing found", body = ProductSummary),
        (status = 404, description = "Listing not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .products
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ProductSummary::from(product)))
}

/// Set absolute stock for a listing
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}/stock",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock updated", body = ProductSummary),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Listing not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Products"
)]
pub async fn set_stock(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .products
        .set_stock(&auth, id, payload.quantity)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ProductSummary::from(product)))
}

/// Take a listing off the market
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/suspend",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Listing suspended", body = ProductSummary),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Listing not found", body = crate::errors::ErrorResponse)
    ),
    security(("UserIdHeader" = [])),
    tag = "Products"
)]
pub async fn suspend_product(
    auth: AuthContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .products
        .suspend(&auth, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(ProductSummary::from(product)))
}
