use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "UserIdHeader",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-id",
                    "Caller identity as a UUID. Pair with `x-user-role` \
                     (`user`, `seller` or `admin`; defaults to `user`).",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Resale API",
        version = "1.0.0",
        description = r#"
# Resale Marketplace API

A second-hand goods marketplace where every listing belongs to an individual
seller. A single cart may hold items from many sellers; checkout splits it
into one order per seller under a shared transaction group, allocating any
wallet coupon discount proportionally across the orders.

## Checkout

`POST /api/v1/checkout` consumes the selected cart lines atomically: stock is
decremented conditionally, orders and order lines are written, the coupon
grant is consumed and its usage recorded. If any line cannot be fulfilled the
whole checkout fails and nothing is charged or reserved.

## Order lifecycle

Orders move through `Pending -> Shipping -> Completed`, with cancellation
from `Pending`, and a return window after completion
(`Completed -> ReturnRequested -> Returned` or back to `Completed`).
Cancelled and returned orders restock their items. `Cancelled` and
`Returned` are terminal.

## Authentication

Identity is taken from the `x-user-id` header (a UUID) plus an optional
`x-user-role` header. Requests without `x-user-id` are rejected with 401.

## Error handling

Errors use a consistent envelope:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock for product ...",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Listing management endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
        (name = "Coupons", description = "Coupon definitions and wallet grants"),
        (name = "Checkout", description = "Cart checkout and order splitting"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Products
        crate::handlers::products::create_product,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::set_stock,
        crate::handlers::products::suspend_product,

        // Cart
        crate::handlers::carts::get_cart,
        crate::handlers::carts::add_line,
        crate::handlers::carts::update_line,
        crate::handlers::carts::remove_line,
        crate::handlers::carts::clear_cart,

        // Coupons
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::claim_coupon,
        crate::handlers::coupons::check_coupon,
        crate::handlers::coupons::list_wallet,

        // Checkout
        crate::handlers::checkout::checkout,

        // Orders
        crate::handlers::orders::list_my_orders,
        crate::handlers::orders::list_selling_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::transition_order,
        crate::handlers::orders::get_transaction_group,

        // Health intentionally omitted from OpenAPI paths for now
    ),
    components(
        schemas(
            // Common types
            crate::handlers::common::PaginationMeta,
            crate::handlers::common::PaginatedResponse<crate::services::products::ProductSummary>,
            crate::handlers::common::PaginatedResponse<crate::services::orders::OrderView>,

            // Product types
            crate::services::products::CreateProductInput,
            crate::services::products::ProductSummary,
            crate::handlers::products::SetStockRequest,

            // Cart types
            crate::services::carts::AddLineInput,
            crate::services::carts::CartLineView,
            crate::services::carts::CartView,
            crate::handlers::carts::UpdateLineRequest,

            // Coupon types
            crate::services::coupons::CreateCouponInput,
            crate::services::coupons::CouponQuote,
            crate::services::coupons::WalletCouponView,

            // Checkout types
            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutOutcome,

            // Order types
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::orders::OrderDetail,
            crate::services::orders::TransactionGroupDetail,
            crate::services::orders::TransitionRequest,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
