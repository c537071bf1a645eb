use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    services::catalog::ProductFilter,
    AppState,
};

/// Customer-facing product reads. Management lives under /admin.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{slug}", get(get_product))
        .with_optional_auth()
}

fn is_staff(auth_user: &Option<Extension<AuthUser>>) -> bool {
    auth_user.as_ref().map(|u| u.is_staff).unwrap_or(false)
}

/// List products with optional category, search and featured filters
#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "catalog",
    params(
        ("category" = Option<String>, Query, description = "Category slug"),
        ("search" = Option<String>, Query, description = "Name/description substring"),
        ("featured" = Option<bool>, Query, description = "Featured flag filter"),
        ("page" = Option<u64>, Query, description = "Page number, 1-based"),
        ("per_page" = Option<u64>, Query, description = "Page size")
    ),
    responses((status = 200, description = "A page of products, newest first"))
)]
pub async fn list_products(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.catalog.list_products(filter, is_staff(&auth_user)).await?;
    Ok(Json(page))
}

/// Product page: the product with images, specifications and variants
#[utoipa::path(
    get,
    path = "/api/v1/products/{slug}",
    tag = "catalog",
    responses(
        (status = 200, description = "Product with sub-resources and current price"),
        (status = 404, description = "Unknown or inactive slug")
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let detail = state.catalog.get_product(&slug, is_staff(&auth_user)).await?;
    Ok(Json(detail))
}
