use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};

use crate::{
    auth::AuthRouterExt,
    errors::ServiceError,
    services::catalog::{
        CategoryInput, ProductImageInput, ProductInput, ProductSpecificationInput,
        ProductVariantInput,
    },
    AppState,
};

/// Back-office surface: dashboard statistics plus catalog management.
/// Every route here sits behind the staff gate.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/statistics", get(statistics))
        .route("/categories", post(create_category))
        .route(
            "/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route("/products", post(create_product))
        .route("/products/{id}", put(update_product).delete(delete_product))
        .route("/products/{id}/images", post(add_image))
        .route("/products/{id}/images/{image_id}", delete(delete_image))
        .route("/products/{id}/specifications", post(add_specification))
        .route(
            "/products/{id}/specifications/{spec_id}",
            delete(delete_specification),
        )
        .route("/products/{id}/variants", post(add_variant))
        .route(
            "/products/{id}/variants/{variant_id}",
            put(update_variant).delete(delete_variant),
        )
        .with_staff()
}

/// Dashboard aggregates
#[utoipa::path(
    get,
    path = "/api/v1/admin/statistics",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Order, revenue, product and user aggregates"),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn statistics(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.stats.statistics().await?;
    Ok(Json(stats))
}

async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CategoryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.catalog.create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CategoryInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.catalog.update_category(id, input).await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.catalog.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ProductInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.catalog.update_product(id, input).await?;
    Ok(Json(product))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ProductImageInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let image = state.catalog.add_product_image(id, input).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn delete_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ServiceError> {
    state.catalog.delete_product_image(id, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_specification(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ProductSpecificationInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let spec = state.catalog.add_product_specification(id, input).await?;
    Ok((StatusCode::CREATED, Json(spec)))
}

async fn delete_specification(
    State(state): State<AppState>,
    Path((id, spec_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .catalog
        .delete_product_specification(id, spec_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_variant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<ProductVariantInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state.catalog.add_product_variant(id, input).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

async fn update_variant(
    State(state): State<AppState>,
    Path((id, variant_id)): Path<(i64, i64)>,
    Json(input): Json<ProductVariantInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let variant = state
        .catalog
        .update_product_variant(id, variant_id, input)
        .await?;
    Ok(Json(variant))
}

async fn delete_variant(
    State(state): State<AppState>,
    Path((id, variant_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .catalog
        .delete_product_variant(id, variant_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
