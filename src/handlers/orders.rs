use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::carts::SESSION_HEADER,
    handlers::common::Pagination,
    services::cart::CartOwner,
    services::checkout::{CheckoutInput, UploadedFile},
    AppState,
};

pub fn routes() -> Router<AppState> {
    let checkout_routes = Router::new()
        .route("/checkout", post(checkout))
        .with_optional_auth();

    let customer = Router::new()
        .route("/", get(list_orders))
        .route("/{id}", get(get_order))
        .with_auth();

    let staff = Router::new()
        .route("/{id}/update_status", post(update_status))
        .route("/{id}/update_payment_status", post(update_payment_status))
        .route("/bulk/confirm", post(bulk_confirm))
        .route("/bulk/ship", post(bulk_ship))
        .route("/bulk/deliver", post(bulk_deliver))
        .route("/bulk/paid", post(bulk_paid))
        .with_staff();

    checkout_routes.merge(customer).merge(staff)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
struct UpdateStatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
struct UpdatePaymentStatusRequest {
    payment_status: String,
}

#[derive(Debug, Deserialize)]
struct BulkRequest {
    order_ids: Vec<i64>,
}

/// Convert the caller's cart into an order.
///
/// Accepts multipart/form-data: text parts carry the billing and delivery
/// fields, file parts named `products[<index>][<file_type>]` attach artwork
/// to the cart line at that index.
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    tag = "orders",
    responses(
        (status = 201, description = "Order created with its items and files, cart cleared"),
        (status = 400, description = "Empty cart or validation failure"),
        (status = 404, description = "No cart for this caller")
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = checkout_owner(auth_user.as_deref(), &headers)?;
    let user_id = auth_user.as_ref().map(|u| u.user_id);

    let mut fields: HashMap<String, String> = HashMap::new();
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(|s| s.to_string()) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServiceError::BadRequest(format!("Failed to read upload: {}", e)))?
                .to_vec();
            files.push(UploadedFile {
                field_name: name,
                file_name,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ServiceError::BadRequest(format!("Invalid form field: {}", e)))?;
            fields.insert(name, value);
        }
    }

    let input = checkout_input_from_fields(&mut fields);
    let outcome = state.checkout.checkout(&owner, user_id, input, files).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order placed successfully",
            "order": outcome.order,
            "items": outcome.items,
            "files": outcome.files,
            "files_uploaded": outcome.files.len(),
        })),
    ))
}

fn checkout_owner(
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

fn checkout_input_from_fields(fields: &mut HashMap<String, String>) -> CheckoutInput {
    let mut take = |key: &str| fields.remove(key).unwrap_or_default();
    let optional = |value: String| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    };

    CheckoutInput {
        first_name: take("first_name"),
        last_name: take("last_name"),
        email: take("email"),
        phone: take("phone"),
        company_name: optional(take("company_name")),
        address_line_1: take("address_line_1"),
        address_line_2: optional(take("address_line_2")),
        city: take("city"),
        state: optional(take("state")),
        country: take("country"),
        postal_code: optional(take("postal_code")),
        order_notes: optional(take("order_notes")),
    }
}

/// The caller's orders, newest first. Staff see every order.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "orders",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "A page of orders"))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<Pagination>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = query.page.unwrap_or(1);
    let per_page = query
        .per_page
        .unwrap_or(state.config.api_default_page_size)
        .min(state.config.api_max_page_size);

    let orders = state.orders.list_orders(&auth_user, page, per_page).await?;
    Ok(Json(orders))
}

/// One order with its items and files
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    tag = "orders",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "The order with items and files"),
        (status = 404, description = "Not found or not owned by the caller")
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.orders.get_order(&auth_user, id).await?;
    let full_name = detail.order.full_name();
    let full_address = detail.order.full_address();
    Ok(Json(json!({
        "order": detail,
        "full_name": full_name,
        "full_address": full_address,
    })))
}

/// Set the fulfilment status of one order (staff)
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/update_status",
    tag = "orders",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Status changed"),
        (status = 400, description = "Unknown status value"),
        (status = 404, description = "Order not found")
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let change = state.orders.update_status(id, &request.status).await?;
    Ok(Json(json!({
        "message": change.message,
        "order": change.order,
    })))
}

async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let change = state
        .orders
        .update_payment_status(id, &request.payment_status)
        .await?;
    Ok(Json(json!({
        "message": change.message,
        "order": change.order,
    })))
}

async fn bulk_confirm(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.orders.mark_confirmed(&request.order_ids).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn bulk_ship(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.orders.mark_shipped(&request.order_ids).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn bulk_deliver(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.orders.mark_delivered(&request.order_ids).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn bulk_paid(
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state.orders.mark_paid(&request.order_ids).await?;
    Ok(Json(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_checkout_input_from_form_fields() {
        let mut fields: HashMap<String, String> = [
            ("first_name", "Amira"),
            ("last_name", "Hassan"),
            ("email", "amira@example.com"),
            ("phone", "+971500000000"),
            ("address_line_1", "1 Sheikh Zayed Rd"),
            ("city", "Dubai"),
            ("country", "AE"),
            ("company_name", "  "),
            ("order_notes", "Deliver after 6pm"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let input = checkout_input_from_fields(&mut fields);
        assert_eq!(input.first_name, "Amira");
        assert_eq!(input.country, "AE");
        assert_eq!(input.company_name, None);
        assert_eq!(input.order_notes.as_deref(), Some("Deliver after 6pm"));
    }

    #[test]
    fn missing_fields_become_empty_strings_for_validation() {
        let mut fields = HashMap::new();
        let input = checkout_input_from_fields(&mut fields);
        assert!(input.first_name.is_empty());
        assert!(input.email.is_empty());
    }
}
