pub mod cart_line;
pub mod coupon;
pub mod coupon_usage;
pub mod order;
pub mod order_line;
pub mod product;
pub mod transaction_group;
pub mod wallet_coupon;

// Re-export entities
pub use cart_line::{Entity as CartLine, Model as CartLineModel};
pub use coupon::{DiscountType, Entity as Coupon, Model as CouponModel};
pub use coupon_usage::{Entity as CouponUsage, Model as CouponUsageModel};
pub use order::{
    Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
};
pub use order_line::{Entity as OrderLine, Model as OrderLineModel};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use transaction_group::{Entity as TransactionGroup, Model as TransactionGroupModel};
pub use wallet_coupon::{Entity as WalletCoupon, Model as WalletCouponModel};
