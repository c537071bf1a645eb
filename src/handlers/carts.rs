use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    services::cart::{AddToCartInput, CartOwner},
    AppState,
};

/// Guest carts are addressed through this header; authenticated requests use
/// the bearer token instead.
pub const SESSION_HEADER: &str = "x-session-id";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add_item", post(add_item))
        .route(
            "/items/{item_id}",
            put(update_item).patch(update_item).delete(remove_item),
        )
        .route("/clear", post(clear_cart))
        .with_optional_auth()
}

fn cart_owner(
    auth_user: Option<&AuthUser>,
    headers: &HeaderMap,
) -> Result<CartOwner, ServiceError> {
    if let Some(user) = auth_user {
        return Ok(CartOwner::User(user.user_id));
    }

    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| CartOwner::Guest(key.to_string()))
        .ok_or_else(|| {
            ServiceError::BadRequest(
                "Provide a bearer token or an X-Session-Id header".to_string(),
            )
        })
}

#[derive(Debug, Deserialize)]
struct UpdateQuantityRequest {
    quantity: i32,
}

/// Current cart, created lazily on first access
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    tag = "cart",
    responses(
        (status = 200, description = "The owner's cart with derived totals"),
        (status = 400, description = "No token and no session header")
    )
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(auth_user.as_deref(), &headers)?;
    let cart = state.carts.get_cart(&owner).await?;
    Ok(Json(cart))
}

/// Add a product to the cart, capturing its price
#[utoipa::path(
    post,
    path = "/api/v1/cart/add_item",
    tag = "cart",
    responses(
        (status = 201, description = "Item added, updated cart returned"),
        (status = 404, description = "Product or variant missing or inactive"),
        (status = 400, description = "Bad quantity")
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
    Json(input): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(auth_user.as_deref(), &headers)?;
    let cart = state.carts.add_item(&owner, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Item added to cart", "cart": cart })),
    ))
}

async fn update_item(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(auth_user.as_deref(), &headers)?;
    let cart = state
        .carts
        .update_item_quantity(&owner, item_id, request.quantity)
        .await?;
    Ok(Json(json!({ "message": "Cart item updated", "cart": cart })))
}

async fn remove_item(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(auth_user.as_deref(), &headers)?;
    let cart = state.carts.remove_item(&owner, item_id).await?;
    Ok(Json(json!({ "message": "Item removed from cart", "cart": cart })))
}

async fn clear_cart(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = cart_owner(auth_user.as_deref(), &headers)?;
    let cart = state.carts.clear_cart(&owner).await?;
    Ok(Json(json!({ "message": "Cart cleared", "cart": cart })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn staffless_user(id: i64) -> AuthUser {
        AuthUser {
            user_id: id,
            name: None,
            email: None,
            is_staff: false,
            token_id: "jti".to_string(),
        }
    }

    #[test]
    fn authenticated_user_wins_over_session_header() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("guest-abc"));

        let owner = cart_owner(Some(&staffless_user(9)), &headers).unwrap();
        assert_eq!(owner, CartOwner::User(9));
    }

    #[test]
    fn guest_session_header_is_used_when_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("guest-abc"));

        let owner = cart_owner(None, &headers).unwrap();
        assert_eq!(owner, CartOwner::Guest("guest-abc".to_string()));
    }

    #[test]
    fn missing_identity_is_a_bad_request() {
        let headers = HeaderMap::new();
        assert!(matches!(
            cart_owner(None, &headers),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn blank_session_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("   "));
        assert!(cart_owner(None, &headers).is_err());
    }
}
