mod common;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};

use printpro_api::entities::product;
use printpro_api::errors::ServiceError;
use printpro_api::services::cart::{AddToCartInput, CartOwner};

use common::spawn_app;

fn add(product_id: i64, variant_id: Option<i64>, quantity: i32) -> AddToCartInput {
    AddToCartInput {
        product_id,
        variant_id,
        quantity,
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn add_item_captures_effective_price() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Flyers", "flyers", dec!(100.00), Some(dec!(80.00)))
        .await;

    let owner = CartOwner::Guest("sess-1".to_string());
    let cart = app
        .state
        .carts
        .add_item(&owner, add(product.id, None, 2))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].price, dec!(80.00));
    assert_eq!(cart.items[0].line_total, dec!(160.00));
    assert_eq!(cart.subtotal, dec!(160.00));
    assert_eq!(cart.items_count, 2);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn variant_adjustment_is_added_to_the_captured_price() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Banner", "banner", dec!(200.00), None)
        .await;
    let variant = app.seed_variant(product.id, "XL", dec!(40.50)).await;

    let owner = CartOwner::Guest("sess-2".to_string());
    let cart = app
        .state
        .carts
        .add_item(&owner, add(product.id, Some(variant.id), 1))
        .await
        .unwrap();

    assert_eq!(cart.items[0].price, dec!(240.50));
    assert_eq!(cart.items[0].variant_name.as_deref(), Some("XL"));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn duplicate_add_merges_quantity_and_keeps_original_price() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Stickers", "stickers", dec!(10.00), None)
        .await;

    let owner = CartOwner::Guest("sess-3".to_string());
    app.state
        .carts
        .add_item(&owner, add(product.id, None, 1))
        .await
        .unwrap();

    // Price change after the first add must not affect the cart line
    let mut active: product::ActiveModel = product.clone().into();
    active.price = Set(dec!(15.00));
    active.update(&*app.state.db).await.unwrap();

    let cart = app
        .state
        .carts
        .add_item(&owner, add(product.id, None, 2))
        .await
        .unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 3);
    assert_eq!(cart.items[0].price, dec!(10.00));
    assert_eq!(cart.subtotal, dec!(30.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn inactive_product_is_not_found() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Old stock", "old-stock", dec!(5.00), None)
        .await;

    let mut active: product::ActiveModel = product.clone().into();
    active.is_active = Set(false);
    active.update(&*app.state.db).await.unwrap();

    let owner = CartOwner::Guest("sess-4".to_string());
    let err = app
        .state
        .carts
        .add_item(&owner, add(product.id, None, 1))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn items_of_another_cart_cannot_be_touched() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Posters", "posters", dec!(25.00), None)
        .await;

    let owner_a = CartOwner::Guest("sess-a".to_string());
    let owner_b = CartOwner::Guest("sess-b".to_string());

    let cart_a = app
        .state
        .carts
        .add_item(&owner_a, add(product.id, None, 1))
        .await
        .unwrap();
    let item_id = cart_a.items[0].id;

    let err = app
        .state
        .carts
        .update_item_quantity(&owner_b, item_id, 5)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app.state.carts.remove_item(&owner_b, item_id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Owner A is unaffected
    let cart_a = app.state.carts.get_cart(&owner_a).await.unwrap();
    assert_eq!(cart_a.items[0].quantity, 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn clear_cart_removes_lines_but_keeps_the_cart() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Mugs", "mugs", dec!(30.00), None)
        .await;

    let owner = CartOwner::Guest("sess-5".to_string());
    app.state
        .carts
        .add_item(&owner, add(product.id, None, 4))
        .await
        .unwrap();

    let before = app.state.carts.get_cart(&owner).await.unwrap();
    let cleared = app.state.carts.clear_cart(&owner).await.unwrap();

    assert_eq!(cleared.id, before.id);
    assert!(cleared.items.is_empty());
    assert_eq!(cleared.subtotal, dec!(0));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn deleting_a_product_removes_its_cart_lines() {
    let app = spawn_app().await;
    let doomed = app
        .seed_product("Discontinued", "discontinued", dec!(20.00), None)
        .await;
    let survivor = app
        .seed_product("Evergreen", "evergreen", dec!(8.00), None)
        .await;

    let owner = CartOwner::Guest("sess-6".to_string());
    app.state
        .carts
        .add_item(&owner, add(doomed.id, None, 1))
        .await
        .unwrap();
    app.state
        .carts
        .add_item(&owner, add(survivor.id, None, 3))
        .await
        .unwrap();

    app.state.catalog.delete_product(doomed.id).await.unwrap();

    let cart = app.state.carts.get_cart(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].product_id, survivor.id);
    assert_eq!(cart.subtotal, dec!(24.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn deleting_a_variant_keeps_the_line_at_its_captured_price() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Canvas", "canvas", dec!(100.00), None)
        .await;
    let variant = app.seed_variant(product.id, "A1", dec!(35.00)).await;

    let owner = CartOwner::Guest("sess-7".to_string());
    app.state
        .carts
        .add_item(&owner, add(product.id, Some(variant.id), 1))
        .await
        .unwrap();

    app.state
        .catalog
        .delete_product_variant(product.id, variant.id)
        .await
        .unwrap();

    let cart = app.state.carts.get_cart(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].variant_id, None);
    assert_eq!(cart.items[0].price, dec!(135.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn http_guest_cart_flow() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Brochures", "brochures", dec!(12.50), None)
        .await;

    let body = serde_json::json!({ "product_id": product.id, "quantity": 2 });
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/cart/add_item")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-session-id", "http-guest")
        .body(Body::from(body.to_string()))
        .unwrap();

    let (status, json) = app.request(request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["message"], "Item added to cart");
    assert_eq!(json["cart"]["items_count"], 2);

    let request = Request::builder()
        .uri("/api/v1/cart")
        .header("x-session-id", "http-guest")
        .body(Body::empty())
        .unwrap();
    let (status, json) = app.request(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    let subtotal: rust_decimal::Decimal = json["subtotal"].as_str().unwrap().parse().unwrap();
    assert_eq!(subtotal, dec!(25.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn http_cart_without_identity_is_rejected() {
    let app = spawn_app().await;
    let request = Request::builder()
        .uri("/api/v1/cart")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.request(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
