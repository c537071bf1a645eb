mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;

use common::spawn_app;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn register_login_and_profile_roundtrip() {
    let app = spawn_app().await;

    let (status, body) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({
                "email": "new@example.com",
                "password": "secret-password",
                "password_confirm": "secret-password",
                "first_name": "Nadia",
                "last_name": "Khoury"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {}", body);
    assert_eq!(body["user"]["email"], "new@example.com");
    assert!(body["user"]["password_hash"].is_null());
    assert!(body["tokens"]["access_token"].is_string());

    let (status, body) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": "new@example.com", "password": "secret-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["tokens"]["access_token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .uri("/api/v1/auth/profile")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.request(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Nadia");
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn duplicate_email_and_password_mismatch_are_rejected() {
    let app = spawn_app().await;
    app.register_user("taken@example.com").await;

    let (status, _) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({
                "email": "taken@example.com",
                "password": "secret-password",
                "password_confirm": "secret-password",
                "first_name": "A",
                "last_name": "B"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/register",
            json!({
                "email": "fresh@example.com",
                "password": "secret-password",
                "password_confirm": "different-password",
                "first_name": "A",
                "last_name": "B"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    app.register_user("who@example.com").await;

    let (status, _) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/login",
            json!({ "email": "who@example.com", "password": "wrong-password" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn refresh_token_issues_a_new_pair() {
    let app = spawn_app().await;
    let (user, _) = app.register_user("refresh@example.com").await;
    let tokens = app.state.auth.generate_token(&user).unwrap();

    let (status, body) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/token/refresh",
            json!({ "refresh_token": tokens.refresh_token }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    // An access token is not accepted as a refresh token
    let (status, _) = app
        .request(json_request(
            "POST",
            "/api/v1/auth/token/refresh",
            json!({ "refresh_token": tokens.access_token }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[cfg_attr(not(feature = "mock-tests"), ignore)]
async fn statistics_require_the_staff_flag() {
    let app = spawn_app().await;
    let (_, customer_token) = app.register_user("plain@example.com").await;
    let (_, staff_token) = app.register_staff("boss@example.com").await;

    let request = Request::builder()
        .uri("/api/v1/admin/statistics")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.request(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/admin/statistics")
        .header(header::AUTHORIZATION, format!("Bearer {}", customer_token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.request(request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/api/v1/admin/statistics")
        .header(header::AUTHORIZATION, format!("Bearer {}", staff_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.request(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"]["total"], 2);
    assert_eq!(body["orders"]["total"], 0);
}
