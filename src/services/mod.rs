// Checkout pipeline
pub mod checkout;
pub mod inventory;
pub mod pricing;

// Catalog and cart
pub mod carts;
pub mod products;

// Coupons and wallet
pub mod coupons;

// Order lifecycle and queries
pub mod orders;

pub use carts::CartService;
pub use checkout::CheckoutService;
pub use coupons::CouponService;
pub use orders::OrderService;
pub use products::ProductService;
