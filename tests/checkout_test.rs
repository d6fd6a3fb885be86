//! End-to-end checkout tests over a real (SQLite) database: order
//! splitting, discount allocation, stock movement and rollback behavior.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;

use common::TestApp;
use resale_api::auth::{AuthContext, Role};
use resale_api::entities::{
    coupon, Coupon, OrderStatus, PaymentMethod, PaymentStatus,
};
use resale_api::errors::ServiceError;

#[tokio::test]
async fn checkout_splits_cart_into_one_order_per_seller() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());

    let cam = app.seed_product(seller_a, "Used camera", dec!(50.00), 5).await;
    let amp = app.seed_product(seller_b, "Tube amp", dec!(200.00), 2).await;

    let line_a = app.add_to_cart(buyer, cam.id, 2).await;
    let line_b = app.add_to_cart(buyer, amp.id, 1).await;

    let master = app.seed_fixed_coupon("SPRING30", dec!(30.00), 10).await;
    let grant = app.claim_coupon(buyer, "SPRING30").await;

    let outcome = app
        .services()
        .checkout
        .checkout(
            buyer,
            app.checkout_request(&[line_a.id, line_b.id], Some(grant.id)),
        )
        .await
        .expect("checkout succeeds");

    assert_eq!(outcome.order_ids.len(), 2);

    // Discount 30 splits 10/20 across subtotals 100/200; shipping is 5.00
    // per order.
    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders.len(), 2);
    let order_a = orders.iter().find(|o| o.seller_id == seller_a).unwrap();
    let order_b = orders.iter().find(|o| o.seller_id == seller_b).unwrap();

    assert_eq!(order_a.subtotal, dec!(100.00));
    assert_eq!(order_a.discount_amount, dec!(10.00));
    assert_eq!(order_a.shipping_fee, dec!(5.00));
    assert_eq!(order_a.total_amount, dec!(95.00));

    assert_eq!(order_b.subtotal, dec!(200.00));
    assert_eq!(order_b.discount_amount, dec!(20.00));
    assert_eq!(order_b.total_amount, dec!(185.00));

    for order in &orders {
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.payment_date, None);
        assert_eq!(order.user_id, buyer);
        assert_eq!(order.receiver_name, "A. Buyer");
        assert_eq!(order.transaction_group_id, outcome.transaction_group_id);
    }

    // Group total equals the sum of order totals.
    let group = app.group(outcome.transaction_group_id).await;
    assert_eq!(group.total_amount, dec!(280.00));
    assert_eq!(group.user_id, buyer);
    assert_eq!(
        group.total_amount,
        orders.iter().map(|o| o.total_amount).sum::<Decimal>()
    );
    assert_eq!(outcome.total_amount, group.total_amount);

    // Stock moved, cart consumed.
    assert_eq!(app.product(cam.id).await.stock_quantity, 3);
    assert_eq!(app.product(amp.id).await.stock_quantity, 1);
    assert!(app.cart_lines_of(buyer).await.is_empty());

    // The grant is spent and the master lost one use.
    assert!(!app.wallet_coupon(grant.id).await.active);
    assert_eq!(app.master_coupon(master.id).await.remaining_uses, 9);

    // One audit row per discounted order, matched by applied amount.
    let mut usages = app.usage_rows_for_group(outcome.transaction_group_id).await;
    usages.sort_by_key(|u| u.applied_amount);
    assert_eq!(usages.len(), 2);
    assert_eq!(usages[0].applied_amount, dec!(10.00));
    assert_eq!(usages[0].order_id, order_a.id);
    assert_eq!(usages[1].applied_amount, dec!(20.00));
    assert_eq!(usages[1].order_id, order_b.id);
    for usage in &usages {
        assert_eq!(usage.user_id, buyer);
    }
}

#[tokio::test]
async fn checkout_without_coupon_charges_full_price() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let book = app.seed_product(seller, "Paperback", dec!(12.50), 4).await;
    let line = app.add_to_cart(buyer, book.id, 2).await;

    let mut request = app.checkout_request(&[line.id], None);
    request.payment_method = PaymentMethod::Online;

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, request)
        .await
        .expect("checkout succeeds");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].subtotal, dec!(25.00));
    assert_eq!(orders[0].discount_amount, Decimal::ZERO);
    assert_eq!(orders[0].total_amount, dec!(30.00));
    assert_eq!(orders[0].payment_method, PaymentMethod::Online);

    let group = app.group(outcome.transaction_group_id).await;
    assert_eq!(group.payment_method, PaymentMethod::Online);
    assert!(app
        .usage_rows_for_group(outcome.transaction_group_id)
        .await
        .is_empty());
}

#[tokio::test]
async fn empty_selection_is_rejected() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();

    let err = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptySelection);

    // Ids that resolve to nothing read the same as an empty selection.
    let err = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[Uuid::new_v4()], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptySelection);

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn unknown_line_mixed_with_real_one_is_not_found() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let chair = app.seed_product(seller, "Desk chair", dec!(80.00), 1).await;
    let line = app.add_to_cart(buyer, chair.id, 1).await;

    let err = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id, Uuid::new_v4()], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product(chair.id).await.stock_quantity, 1);
}

#[tokio::test]
async fn selecting_another_users_cart_line_is_forbidden() {
    let app = TestApp::new().await;
    let (alice, mallory) = (Uuid::new_v4(), Uuid::new_v4());
    let seller = Uuid::new_v4();

    let bike = app.seed_product(seller, "City bike", dec!(150.00), 1).await;
    let alices_line = app.add_to_cart(alice, bike.id, 1).await;

    let err = app
        .services()
        .checkout
        .checkout(mallory, app.checkout_request(&[alices_line.id], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::UnauthorizedAccess);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.cart_lines_of(alice).await.len(), 1);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_entire_checkout() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());

    let lamp = app.seed_product(seller_a, "Desk lamp", dec!(20.00), 5).await;
    let rug = app.seed_product(seller_b, "Wool rug", dec!(60.00), 1).await;

    let line_a = app.add_to_cart(buyer, lamp.id, 2).await;
    let line_b = app.add_to_cart(buyer, rug.id, 1).await;

    app.seed_fixed_coupon("RUGS5", dec!(5.00), 3).await;
    let grant = app.claim_coupon(buyer, "RUGS5").await;

    // The rug sells out between carting and checkout.
    app.services()
        .products
        .set_stock(&AuthContext::new(seller_b, Role::Seller), rug.id, 0)
        .await
        .unwrap();

    let err = app
        .services()
        .checkout
        .checkout(
            buyer,
            app.checkout_request(&[line_a.id, line_b.id], Some(grant.id)),
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            product_id,
            available: 0,
        } if product_id == rug.id
    );

    // Nothing committed: no orders, no group, untouched stock, cart and
    // grant intact.
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.group_count().await, 0);
    assert_eq!(app.product(lamp.id).await.stock_quantity, 5);
    assert_eq!(app.cart_lines_of(buyer).await.len(), 2);
    assert!(app.wallet_coupon(grant.id).await.active);
}

#[tokio::test]
async fn using_someone_elses_wallet_coupon_is_rejected() {
    let app = TestApp::new().await;
    let (alice, mallory) = (Uuid::new_v4(), Uuid::new_v4());
    let seller = Uuid::new_v4();

    let skis = app.seed_product(seller, "Cross-country skis", dec!(90.00), 2).await;
    let line = app.add_to_cart(mallory, skis.id, 1).await;

    app.seed_fixed_coupon("ALICE10", dec!(10.00), 5).await;
    let alices_grant = app.claim_coupon(alice, "ALICE10").await;

    let err = app
        .services()
        .checkout
        .checkout(
            mallory,
            app.checkout_request(&[line.id], Some(alices_grant.id)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CouponNotOwned);

    assert_eq!(app.order_count().await, 0);
    assert!(app.wallet_coupon(alices_grant.id).await.active);
}

#[tokio::test]
async fn a_spent_grant_cannot_be_redeemed_again() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let mug = app.seed_product(seller, "Enamel mug", dec!(8.00), 10).await;
    app.seed_fixed_coupon("ONCE2", dec!(2.00), 5).await;
    let grant = app.claim_coupon(buyer, "ONCE2").await;

    let first = app.add_to_cart(buyer, mug.id, 1).await;
    app.services()
        .checkout
        .checkout(buyer, app.checkout_request(&[first.id], Some(grant.id)))
        .await
        .expect("first checkout succeeds");

    let second = app.add_to_cart(buyer, mug.id, 1).await;
    let err = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[second.id], Some(grant.id)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CouponNotFound);
}

#[tokio::test]
async fn discount_never_exceeds_the_merchandise_value() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let pin = app.seed_product(seller, "Badge pin", dec!(100.00), 1).await;
    let line = app.add_to_cart(buyer, pin.id, 1).await;

    app.seed_fixed_coupon("WHALE500", dec!(500.00), 1).await;
    let grant = app.claim_coupon(buyer, "WHALE500").await;

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id], Some(grant.id)))
        .await
        .expect("checkout succeeds");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders[0].discount_amount, dec!(100.00));
    // Only shipping is left to pay.
    assert_eq!(orders[0].total_amount, dec!(5.00));
}

#[tokio::test]
async fn grant_survives_its_master_definition_lapsing() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let tent = app.seed_product(seller, "Two-person tent", dec!(75.00), 1).await;
    let line = app.add_to_cart(buyer, tent.id, 1).await;

    let master = app.seed_fixed_coupon("CAMP15", dec!(15.00), 3).await;
    let grant = app.claim_coupon(buyer, "CAMP15").await;

    // The master is switched off after the grant was handed out.
    let mut lapsed: coupon::ActiveModel = master.clone().into();
    lapsed.active = Set(false);
    lapsed.update(app.db()).await.unwrap();

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id], Some(grant.id)))
        .await
        .expect("grant is honored despite the lapsed master");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders[0].discount_amount, dec!(15.00));

    // The master still exists, so the audit row is written and a use is
    // spent.
    let usages = app.usage_rows_for_group(outcome.transaction_group_id).await;
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].coupon_id, master.id);
    assert_eq!(app.master_coupon(master.id).await.remaining_uses, 2);
}

#[tokio::test]
async fn grant_with_deleted_master_applies_without_audit_row() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let kettle = app.seed_product(seller, "Stove kettle", dec!(40.00), 1).await;
    let line = app.add_to_cart(buyer, kettle.id, 1).await;

    let master = app.seed_fixed_coupon("GONE5", dec!(5.00), 2).await;
    let grant = app.claim_coupon(buyer, "GONE5").await;

    Coupon::delete_by_id(master.id)
        .exec(app.db())
        .await
        .unwrap();

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id], Some(grant.id)))
        .await
        .expect("grant is honored despite the missing master");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders[0].discount_amount, dec!(5.00));
    assert_eq!(orders[0].total_amount, dec!(40.00));

    // No master row to reference, so no usage row; the grant is still
    // consumed.
    assert!(app
        .usage_rows_for_group(outcome.transaction_group_id)
        .await
        .is_empty());
    assert!(!app.wallet_coupon(grant.id).await.active);
}

#[tokio::test]
async fn product_without_seller_fails_the_whole_checkout() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let orphan = app.seed_unowned_product(dec!(10.00), 3).await;
    let owned = app.seed_product(seller, "Gloves", dec!(6.00), 3).await;

    let line_orphan = app.add_to_cart(buyer, orphan.id, 1).await;
    let line_owned = app.add_to_cart(buyer, owned.id, 1).await;

    let err = app
        .services()
        .checkout
        .checkout(
            buyer,
            app.checkout_request(&[line_orphan.id, line_owned.id], None),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::SellerUnresolved(id) if id == orphan.id);

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product(owned.id).await.stock_quantity, 3);
    assert_eq!(app.cart_lines_of(buyer).await.len(), 2);
}

#[tokio::test]
async fn duplicate_line_ids_are_collapsed() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let fan = app.seed_product(seller, "Box fan", dec!(25.00), 5).await;
    let line = app.add_to_cart(buyer, fan.id, 2).await;

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id, line.id], None))
        .await
        .expect("checkout succeeds");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].subtotal, dec!(50.00));
    // Decremented once, not twice.
    assert_eq!(app.product(fan.id).await.stock_quantity, 3);
}

#[tokio::test]
async fn suspended_listing_fails_checkout() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    let coat = app.seed_product(seller, "Winter coat", dec!(45.00), 2).await;
    let line = app.add_to_cart(buyer, coat.id, 1).await;

    app.services()
        .products
        .suspend(&AuthContext::new(seller, Role::Seller), coat.id)
        .await
        .unwrap();

    let err = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&[line.id], None))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.product(coat.id).await.stock_quantity, 2);
}

#[tokio::test]
async fn leftover_cents_are_distributed_without_loss() {
    let app = TestApp::new().await;
    let buyer = Uuid::new_v4();
    let sellers = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

    // Three sellers with equal 50.00 subtotals; a 10.00 coupon cannot
    // split evenly and must land as 3.34/3.33/3.33 in some order.
    let mut line_ids = Vec::new();
    for (i, seller) in sellers.iter().enumerate() {
        let product = app
            .seed_product(*seller, &format!("Lot {}", i), dec!(50.00), 1)
            .await;
        let line = app.add_to_cart(buyer, product.id, 1).await;
        line_ids.push(line.id);
    }

    app.seed_fixed_coupon("SPLIT10", dec!(10.00), 1).await;
    let grant = app.claim_coupon(buyer, "SPLIT10").await;

    let outcome = app
        .services()
        .checkout
        .checkout(buyer, app.checkout_request(&line_ids, Some(grant.id)))
        .await
        .expect("checkout succeeds");

    let orders = app.orders_in_group(outcome.transaction_group_id).await;
    assert_eq!(orders.len(), 3);

    let mut discounts: Vec<Decimal> = orders.iter().map(|o| o.discount_amount).collect();
    discounts.sort();
    assert_eq!(discounts, vec![dec!(3.33), dec!(3.33), dec!(3.34)]);
    assert_eq!(
        orders.iter().map(|o| o.discount_amount).sum::<Decimal>(),
        dec!(10.00)
    );

    let group = app.group(outcome.transaction_group_id).await;
    assert_eq!(
        group.total_amount,
        orders.iter().map(|o| o.total_amount).sum::<Decimal>()
    );
}
