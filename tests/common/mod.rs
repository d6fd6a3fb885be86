// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use resale_api::{
    auth::{AuthContext, Role},
    config::AppConfig,
    db,
    entities::{
        cart_line, coupon_usage, order, CartLine, CartLineModel, Coupon, CouponModel, CouponUsage,
        CouponUsageModel, DiscountType, Order, OrderModel, Product, ProductModel,
        TransactionGroup, TransactionGroupModel, WalletCoupon, WalletCouponModel,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        checkout::CheckoutRequest,
        coupons::CreateCouponInput,
        products::CreateProductInput,
    },
    AppState,
};

/// Harness spinning up the full application over a throwaway SQLite file.
///
/// The pool is capped at a single connection so concurrent checkouts
/// serialize instead of tripping over SQLite write locks.
pub struct TestApp {
    pub state: AppState,
    router: Router,
    _db_dir: tempfile::TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("resale_test.db");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            0,
            "development".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = resale_api::app(state.clone());

        Self {
            state,
            router,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn db(&self) -> &db::DbPool {
        &self.state.db
    }

    /// Sends a request against the router, optionally with identity headers.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        actor: Option<(Uuid, &str)>,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = actor {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    // --- seed helpers -----------------------------------------------------

    pub async fn seed_product(
        &self,
        seller_id: Uuid,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductModel {
        self.services()
            .products
            .create(
                &AuthContext::new(seller_id, Role::Seller),
                CreateProductInput {
                    name: name.to_string(),
                    price,
                    stock_quantity: stock,
                    seller_id: None,
                },
            )
            .await
            .expect("seed product for tests")
    }

    /// A listing with no owning seller, as an admin can create.
    pub async fn seed_unowned_product(&self, price: Decimal, stock: i32) -> ProductModel {
        self.services()
            .products
            .create(
                &AuthContext::new(Uuid::new_v4(), Role::Admin),
                CreateProductInput {
                    name: "Platform listing".to_string(),
                    price,
                    stock_quantity: stock,
                    seller_id: None,
                },
            )
            .await
            .expect("seed unowned product for tests")
    }

    pub async fn add_to_cart(
        &self,
        buyer: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> CartLineModel {
        self.services()
            .carts
            .add_line(
                buyer,
                resale_api::services::carts::AddLineInput {
                    product_id,
                    quantity,
                },
            )
            .await
            .expect("seed cart line for tests")
    }

    /// A Fixed master definition valid for the next 30 days.
    pub async fn seed_fixed_coupon(&self, code: &str, value: Decimal, uses: i32) -> CouponModel {
        let now = Utc::now();
        self.services()
            .coupons
            .create_definition(
                &AuthContext::new(Uuid::new_v4(), Role::Admin),
                CreateCouponInput {
                    code: code.to_string(),
                    discount_type: DiscountType::Fixed,
                    discount_value: value,
                    min_order_amount: Decimal::ZERO,
                    valid_from: now - Duration::days(1),
                    valid_to: now + Duration::days(30),
                    remaining_uses: uses,
                    seller_id: None,
                },
            )
            .await
            .expect("seed coupon definition for tests")
    }

    pub async fn claim_coupon(&self, buyer: Uuid, code: &str) -> WalletCouponModel {
        self.services()
            .coupons
            .grant(buyer, code)
            .await
            .expect("claim coupon for tests")
    }

    pub fn checkout_request(
        &self,
        line_ids: &[Uuid],
        wallet_coupon_id: Option<Uuid>,
    ) -> CheckoutRequest {
        CheckoutRequest {
            selected_line_ids: line_ids.to_vec(),
            receiver_name: "A. Buyer".to_string(),
            receiver_phone: "010-0000-0000".to_string(),
            shipping_address: "1 Main St, Springfield".to_string(),
            payment_method: resale_api::entities::PaymentMethod::Cod,
            wallet_coupon_id,
        }
    }

    // --- read-back helpers ------------------------------------------------

    pub async fn product(&self, id: Uuid) -> ProductModel {
        Product::find_by_id(id)
            .one(self.db())
            .await
            .expect("query product")
            .expect("product row exists")
    }

    pub async fn order(&self, id: Uuid) -> OrderModel {
        Order::find_by_id(id)
            .one(self.db())
            .await
            .expect("query order")
            .expect("order row exists")
    }

    pub async fn orders_in_group(&self, group_id: Uuid) -> Vec<OrderModel> {
        Order::find()
            .filter(order::Column::TransactionGroupId.eq(group_id))
            .all(self.db())
            .await
            .expect("query orders in group")
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        Order::find().count(self.db()).await.expect("count orders")
    }

    pub async fn group_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        TransactionGroup::find()
            .count(self.db())
            .await
            .expect("count transaction groups")
    }

    pub async fn group(&self, id: Uuid) -> TransactionGroupModel {
        TransactionGroup::find_by_id(id)
            .one(self.db())
            .await
            .expect("query transaction group")
            .expect("transaction group row exists")
    }

    pub async fn wallet_coupon(&self, id: Uuid) -> WalletCouponModel {
        WalletCoupon::find_by_id(id)
            .one(self.db())
            .await
            .expect("query wallet coupon")
            .expect("wallet coupon row exists")
    }

    pub async fn master_coupon(&self, id: Uuid) -> CouponModel {
        Coupon::find_by_id(id)
            .one(self.db())
            .await
            .expect("query coupon")
            .expect("coupon row exists")
    }

    pub async fn usage_rows_for_group(&self, group_id: Uuid) -> Vec<CouponUsageModel> {
        CouponUsage::find()
            .filter(coupon_usage::Column::TransactionGroupId.eq(group_id))
            .all(self.db())
            .await
            .expect("query coupon usage rows")
    }

    pub async fn cart_lines_of(&self, user_id: Uuid) -> Vec<CartLineModel> {
        CartLine::find()
            .filter(cart_line::Column::UserId.eq(user_id))
            .all(self.db())
            .await
            .expect("query cart lines")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
