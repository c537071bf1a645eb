use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    AppState,
};

/// Customer-facing category reads. Management lives under /admin.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{slug}", get(get_category))
        .route("/{slug}/products", get(category_products))
        .with_optional_auth()
}

fn is_staff(auth_user: &Option<Extension<AuthUser>>) -> bool {
    auth_user.as_ref().map(|u| u.is_staff).unwrap_or(false)
}

/// List categories. Staff also see inactive ones.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    tag = "catalog",
    responses((status = 200, description = "Categories ordered by sort order"))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.catalog.list_categories(is_staff(&auth_user)).await?;
    Ok(Json(categories))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/{slug}",
    tag = "catalog",
    responses(
        (status = 200, description = "The category"),
        (status = 404, description = "Unknown or inactive slug")
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    auth_user: Option<Extension<AuthUser>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.catalog.get_category(&slug, is_staff(&auth_user)).await?;
    Ok(Json(category))
}

/// Active products of one category
#[utoipa::path(
    get,
    path = "/api/v1/categories/{slug}/products",
    tag = "catalog",
    responses(
        (status = 200, description = "Active products of the category"),
        (status = 404, description = "Unknown or inactive slug")
    )
)]
pub async fn category_products(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.catalog.category_products(&slug).await?;
    Ok(Json(products))
}
