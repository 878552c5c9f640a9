//! End-to-end cart synchronization scenarios against a scripted gateway.

use std::sync::Arc;

use stonemill_core::{CurrencyCode, VariantId};
use stonemill_storefront::cart::{CartError, CartService, MemoryMirror};

use stonemill_integration_tests::{ScriptedGateway, test_item};

const MAX_PER_ITEM: u32 = 10;

fn service(gateway: &ScriptedGateway) -> CartService<ScriptedGateway> {
    CartService::new(
        gateway.clone(),
        MemoryMirror::new(),
        MAX_PER_ITEM,
        CurrencyCode::NZD,
    )
}

// =============================================================================
// Shopper journey
// =============================================================================

#[tokio::test]
async fn full_shopper_journey() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20), ("glass-bowl", 5)]);
    let cart = service(&gateway);

    // Add two products, bump one to 3 units.
    cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect("add matcha");
    cart.add(test_item("glass-bowl", "Glass Whisk Bowl", 6400))
        .await
        .expect("add bowl");
    cart.set_quantity(&VariantId::new("matcha-30g"), 3)
        .await
        .expect("set quantity");

    let snapshot = cart.snapshot().await;
    assert_eq!(snapshot.lines.len(), 2);
    assert_eq!(snapshot.count, 4);

    // The remote cart agrees.
    let remote = gateway.cart("gid://shopify/Cart/1").expect("remote cart");
    assert_eq!(remote.total_quantity, 4);

    // Remove the bowl; checkout resolves to the remote checkout URL.
    cart.remove(&VariantId::new("glass-bowl"))
        .await
        .expect("remove bowl");
    let url = cart.checkout_url().await.expect("checkout url");
    assert_eq!(
        url.as_deref(),
        Some("https://stonemill.myshopify.com/checkout/1")
    );
}

#[tokio::test]
async fn checkout_url_is_none_before_any_mutation() {
    let gateway = ScriptedGateway::new();
    let cart = service(&gateway);

    assert!(cart.checkout_url().await.expect("no remote cart").is_none());
}

// =============================================================================
// Bounds
// =============================================================================

#[tokio::test]
async fn adds_stop_at_the_configured_ceiling() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 100)]);
    let cart = service(&gateway);

    for _ in 0..MAX_PER_ITEM {
        cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
            .await
            .expect("add within ceiling");
    }
    let err = cart
        .add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect_err("ceiling exceeded");

    assert!(matches!(
        err,
        CartError::QuantityLimitExceeded { max: MAX_PER_ITEM, .. }
    ));
    assert_eq!(cart.snapshot().await.count, MAX_PER_ITEM);
}

#[tokio::test]
async fn out_of_stock_blocks_both_sides() {
    let gateway = ScriptedGateway::with_stock(&[("glass-bowl", 2)]);
    let cart = service(&gateway);

    cart.add(test_item("glass-bowl", "Glass Whisk Bowl", 6400))
        .await
        .expect("first add");
    cart.add(test_item("glass-bowl", "Glass Whisk Bowl", 6400))
        .await
        .expect("second add");
    let err = cart
        .add(test_item("glass-bowl", "Glass Whisk Bowl", 6400))
        .await
        .expect_err("stock exhausted");

    assert!(matches!(err, CartError::OutOfStock { .. }));
    assert_eq!(cart.snapshot().await.count, 2);
    let remote = gateway.cart("gid://shopify/Cart/1").expect("remote cart");
    assert_eq!(remote.total_quantity, 2);
}

// =============================================================================
// Currency change
// =============================================================================

#[tokio::test]
async fn currency_change_replays_the_cart_under_the_new_currency() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20)]);
    let cart = service(&gateway);

    cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect("add");
    cart.set_quantity(&VariantId::new("matcha-30g"), 3)
        .await
        .expect("set quantity");

    cart.change_currency(CurrencyCode::AUD)
        .await
        .expect("switch currency");

    let snapshot = cart.snapshot().await;
    assert_eq!(snapshot.currency_code, CurrencyCode::AUD);
    assert_eq!(snapshot.count, 3);

    let fresh = gateway.cart("gid://shopify/Cart/2").expect("new cart");
    assert_eq!(fresh.currency_code, CurrencyCode::AUD);
    assert_eq!(fresh.total_quantity, 3);

    // The NZD cart is simply abandoned.
    let old = gateway.cart("gid://shopify/Cart/1").expect("old cart");
    assert_eq!(old.currency_code, CurrencyCode::NZD);
}

// =============================================================================
// Failure and recovery
// =============================================================================

#[tokio::test]
async fn failed_add_recovers_on_a_replacement_cart() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20), ("glass-bowl", 5)]);
    let cart = service(&gateway);

    cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect("add matcha");

    gateway.script(|state| state.fail_adds = 1);
    cart.add(test_item("glass-bowl", "Glass Whisk Bowl", 6400))
        .await
        .expect("add recovers via retry");

    // The replacement cart holds both lines.
    let fresh = gateway.cart("gid://shopify/Cart/2").expect("replacement");
    assert_eq!(fresh.lines.len(), 2);
    assert_eq!(cart.snapshot().await.count, 2);
}

#[tokio::test]
async fn remove_always_wins_locally() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20)]);
    let cart = service(&gateway);

    cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect("add");

    // Both the removal and the rebuild fail.
    gateway.script(|state| {
        state.fail_removes = 1;
        state.fail_creates = 1;
    });

    cart.remove(&VariantId::new("matcha-30g"))
        .await
        .expect("remove never fails");
    assert!(cart.snapshot().await.is_empty());
}

#[tokio::test]
async fn set_quantity_to_zero_removes_despite_remote_failure() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20)]);
    let cart = service(&gateway);

    cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
        .await
        .expect("add");

    gateway.script(|state| {
        state.fail_removes = 1;
        state.fail_creates = 1;
    });

    cart.set_quantity(&VariantId::new("matcha-30g"), 0)
        .await
        .expect("quantity zero is removal");
    assert!(cart.snapshot().await.is_empty());
}

// =============================================================================
// Per-variant serialization
// =============================================================================

#[tokio::test]
async fn overlapping_adds_on_one_variant_serialize() {
    let gateway = ScriptedGateway::with_stock(&[("matcha-30g", 20)]);
    let cart = Arc::new(service(&gateway));

    let a = {
        let cart = Arc::clone(&cart);
        tokio::spawn(async move {
            cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
                .await
        })
    };
    let b = {
        let cart = Arc::clone(&cart);
        tokio::spawn(async move {
            cart.add(test_item("matcha-30g", "Ceremonial Matcha 30g", 3800))
                .await
        })
    };

    a.await.expect("join").expect("first add");
    b.await.expect("join").expect("second add");

    // No lost update: both increments landed.
    let snapshot = cart.snapshot().await;
    assert_eq!(snapshot.lines.len(), 1);
    assert_eq!(snapshot.count, 2);
    let remote = gateway.cart("gid://shopify/Cart/1").expect("remote cart");
    assert_eq!(remote.total_quantity, 2);
}
