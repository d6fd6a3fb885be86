pub mod carts;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod products;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CartService, CheckoutService, CouponService, OrderService, ProductService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub carts: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let products = Arc::new(ProductService::new(db_pool.clone(), event_sender.clone()));
        let carts = Arc::new(CartService::new(db_pool.clone(), event_sender.clone()));
        let coupons = Arc::new(CouponService::new(db_pool.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            config.shipping_fee,
        ));
        let orders = Arc::new(OrderService::new(db_pool, event_sender));

        Self {
            products,
            carts,
            coupons,
            checkout,
            orders,
        }
    }
}
