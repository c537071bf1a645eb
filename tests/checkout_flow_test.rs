mod common;

use assert_matches::assert_matches;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use printpro_api::entities::{order, order_file, order_item, product};
use printpro_api::errors::ServiceError;
use printpro_api::services::cart::{AddToCartInput, CartOwner};
use printpro_api::services::checkout::{CheckoutInput, UploadedFile};

use common::spawn_app;

static ORDER_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ORD-\d{8}-[0-9A-F]{8}$").unwrap());

fn checkout_input() -> CheckoutInput {
    CheckoutInput {
        first_name: "Amira".to_string(),
        last_name: "Hassan".to_string(),
        email: "amira@example.com".to_string(),
        phone: "+971500000000".to_string(),
        company_name: None,
        address_line_1: "1 Sheikh Zayed Rd".to_string(),
        address_line_2: None,
        city: "Dubai".to_string(),
        state: None,
        country: "AE".to_string(),
        postal_code: None,
        order_notes: None,
    }
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn checkout_snapshots_prices_and_clears_the_cart() {
    let app = spawn_app().await;
    let cards = app
        .seed_product("Business Cards", "business-cards", dec!(100.00), None)
        .await;
    let banner = app
        .seed_product("Banner", "banner", dec!(50.00), None)
        .await;

    let owner = CartOwner::Guest("chk-1".to_string());
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: cards.id,
                variant_id: None,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: banner.id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let outcome = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), vec![])
        .await
        .unwrap();

    assert!(ORDER_NUMBER_RE.is_match(&outcome.order.order_number));
    assert_eq!(outcome.order.subtotal, dec!(250.00));
    assert_eq!(outcome.order.shipping_cost, dec!(0));
    assert_eq!(outcome.order.tax, dec!(0));
    assert_eq!(outcome.order.total, dec!(250.00));
    assert_eq!(outcome.order.status, order::OrderStatus::Pending);
    assert_eq!(outcome.order.payment_status, order::PaymentStatus::Pending);

    assert_eq!(outcome.items.len(), 2);
    let totals: Vec<_> = outcome.items.iter().map(|i| i.total).collect();
    assert!(totals.contains(&dec!(200.00)));
    assert!(totals.contains(&dec!(50.00)));
    assert_eq!(outcome.items[0].product_name, "Business Cards");

    let cart = app.state.carts.get_cart(&owner).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn empty_cart_checkout_creates_nothing() {
    let app = spawn_app().await;
    let owner = CartOwner::Guest("chk-2".to_string());

    // Touch the cart so it exists but stays empty
    app.state.carts.get_cart(&owner).await.unwrap();

    let err = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), vec![])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);

    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn checkout_without_a_cart_is_not_found() {
    let app = spawn_app().await;
    let owner = CartOwner::Guest("never-seen".to_string());

    let err = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), vec![])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn missing_contact_fields_fail_validation() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Flyer", "flyer", dec!(10.00), None)
        .await;
    let owner = CartOwner::Guest("chk-3".to_string());
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: product.id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let mut input = checkout_input();
    input.email = "not-an-email".to_string();
    input.city = String::new();

    let err = app
        .state
        .checkout
        .checkout(&owner, None, input, vec![])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Nothing was mutated
    let cart = app.state.carts.get_cart(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 1);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn two_checkouts_produce_distinct_order_numbers() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Stamp", "stamp", dec!(45.00), None)
        .await;

    let mut numbers = Vec::new();
    for session in ["s1", "s2"] {
        let owner = CartOwner::Guest(session.to_string());
        app.state
            .carts
            .add_item(
                &owner,
                AddToCartInput {
                    product_id: product.id,
                    variant_id: None,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        let outcome = app
            .state
            .checkout
            .checkout(&owner, None, checkout_input(), vec![])
            .await
            .unwrap();
        numbers.push(outcome.order.order_number);
    }

    assert_ne!(numbers[0], numbers[1]);
    assert!(numbers.iter().all(|n| ORDER_NUMBER_RE.is_match(n)));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn files_attach_to_cart_lines_and_bad_keys_are_dropped() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Roll-up", "roll-up", dec!(150.00), None)
        .await;

    let owner = CartOwner::Guest("chk-files".to_string());
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: product.id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let files = vec![
        UploadedFile {
            field_name: "products[0][specificDesign]".to_string(),
            file_name: "artwork.png".to_string(),
            data: b"png bytes".to_vec(),
        },
        // Index past the single cart line: dropped, not an error
        UploadedFile {
            field_name: "products[5][specificDesign]".to_string(),
            file_name: "ignored.png".to_string(),
            data: b"more bytes".to_vec(),
        },
        // Malformed key: dropped
        UploadedFile {
            field_name: "attachments[0]".to_string(),
            file_name: "ignored.pdf".to_string(),
            data: b"pdf bytes".to_vec(),
        },
    ];

    let outcome = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), files)
        .await
        .unwrap();

    // The outcome carries the persisted file rows, not just a count
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].order_id, outcome.order.id);
    assert_eq!(outcome.files[0].file_name, "artwork.png");
    assert_eq!(outcome.files[0].file_type, "specificDesign");
    assert_eq!(outcome.files[0].product_name.as_deref(), Some("Roll-up"));
    assert_eq!(outcome.files[0].file_size, 9);

    let stored = order_file::Entity::find().all(&*app.state.db).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, outcome.files[0].id);
    assert_eq!(stored[0].file_name, "artwork.png");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn disallowed_file_extension_fails_the_checkout() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Sign", "sign", dec!(60.00), None)
        .await;

    let owner = CartOwner::Guest("chk-badext".to_string());
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: product.id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    let files = vec![
        // A valid part first; it still must not reach the disk
        UploadedFile {
            field_name: "products[0][emiratesId]".to_string(),
            file_name: "id.pdf".to_string(),
            data: b"pdf bytes".to_vec(),
        },
        UploadedFile {
            field_name: "products[0][specificDesign]".to_string(),
            file_name: "malware.exe".to_string(),
            data: b"nope".to_vec(),
        },
    ];

    let err = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), files)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Rolled back: no order, cart intact
    let orders = order::Entity::find().all(&*app.state.db).await.unwrap();
    assert!(orders.is_empty());
    let cart = app.state.carts.get_cart(&owner).await.unwrap();
    assert_eq!(cart.items.len(), 1);

    // Nothing was written to the upload directory either
    let upload_dir = std::path::Path::new(&app.state.config.upload_dir);
    assert!(
        !upload_dir.exists()
            || std::fs::read_dir(upload_dir).unwrap().next().is_none()
    );
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn order_snapshots_survive_catalog_deletions() {
    let app = spawn_app().await;
    let category = app.seed_category("Large Format", "large-format").await;
    let seeded = app
        .seed_product("Vinyl Banner", "vinyl-banner", dec!(120.00), None)
        .await;
    let mut active: product::ActiveModel = seeded.clone().into();
    active.category_id = Set(Some(category.id));
    let seeded = active.update(&*app.state.db).await.unwrap();

    let owner = CartOwner::Guest("chk-snapshots".to_string());
    app.state
        .carts
        .add_item(
            &owner,
            AddToCartInput {
                product_id: seeded.id,
                variant_id: None,
                quantity: 1,
            },
        )
        .await
        .unwrap();
    let outcome = app
        .state
        .checkout
        .checkout(&owner, None, checkout_input(), vec![])
        .await
        .unwrap();

    // Category deletion takes its products with it
    app.state.catalog.delete_category(category.id).await.unwrap();
    let remaining = product::Entity::find_by_id(seeded.id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(remaining.is_none());

    // The order line loses its product reference but keeps its snapshot
    let item = order_item::Entity::find_by_id(outcome.items[0].id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.product_id, None);
    assert_eq!(item.product_name, "Vinyl Banner");
    assert_eq!(item.total, dec!(120.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn http_multipart_checkout() {
    let app = spawn_app().await;
    let product = app
        .seed_product("Letterhead", "letterhead", dec!(35.00), None)
        .await;

    let add = serde_json::json!({ "product_id": product.id, "quantity": 2 });
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/cart/add_item")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-session-id", "http-chk")
        .body(Body::from(add.to_string()))
        .unwrap();
    let (status, _) = app.request(request).await;
    assert_eq!(status, StatusCode::CREATED);

    let boundary = "X-PRINTPRO-TEST-BOUNDARY";
    let mut body = String::new();
    for (name, value) in [
        ("first_name", "Amira"),
        ("last_name", "Hassan"),
        ("email", "amira@example.com"),
        ("phone", "+971500000000"),
        ("address_line_1", "1 Sheikh Zayed Rd"),
        ("city", "Dubai"),
        ("country", "AE"),
    ] {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            boundary, name, value
        ));
    }
    body.push_str(&format!(
        "--{}\r\nContent-Disposition: form-data; name=\"products[0][specificDesign]\"; filename=\"art.pdf\"\r\nContent-Type: application/pdf\r\n\r\nfake pdf\r\n",
        boundary
    ));
    body.push_str(&format!("--{}--\r\n", boundary));

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/orders/checkout")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .header("x-session-id", "http-chk")
        .body(Body::from(body))
        .unwrap();

    let (status, json) = app.request(request).await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", json);
    assert_eq!(json["message"], "Order placed successfully");
    assert_eq!(json["files_uploaded"], 1);
    assert_eq!(json["files"].as_array().unwrap().len(), 1);
    assert_eq!(json["files"][0]["file_name"], "art.pdf");
    assert_eq!(json["files"][0]["file_type"], "specificDesign");
    let total: rust_decimal::Decimal = json["order"]["total"].as_str().unwrap().parse().unwrap();
    assert_eq!(total, dec!(70.00));

    // Cart is empty afterwards
    let request = Request::builder()
        .uri("/api/v1/cart")
        .header("x-session-id", "http-chk")
        .body(Body::empty())
        .unwrap();
    let (_, json) = app.request(request).await;
    assert_eq!(json["items"].as_array().unwrap().len(), 0);
}
