/*!
 * PrintPro storefront backend.
 *
 * Catalog, guest and account carts, checkout with artwork uploads, and
 * back-office order management over axum and sea-orm.
 */

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod request_id;
pub mod services;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, response::IntoResponse, routing::get, Extension, Json, Router};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::warn;

use crate::auth::{AuthConfig, AuthService};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{CartService, CatalogService, CheckoutService, OrderService, StatsService};
use crate::storage::FileStorage;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub auth: Arc<AuthService>,
    pub carts: CartService,
    pub catalog: CatalogService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub stats: StatsService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            AuthConfig::from_app_config(&config),
            db.clone(),
        ));
        let storage = FileStorage::new(config.upload_dir.clone());

        Self {
            carts: CartService::new(db.clone(), event_sender.clone()),
            catalog: CatalogService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), storage, event_sender.clone()),
            orders: OrderService::new(db.clone(), event_sender.clone()),
            stats: StatsService::new(db.clone()),
            db,
            config,
            event_sender,
            auth,
        }
    }
}

/// All versioned API routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .nest("/auth", handlers::auth::routes())
        .nest("/cart", handlers::carts::routes())
        .nest("/categories", handlers::categories::routes())
        .nest("/products", handlers::products::routes())
        .nest("/orders", handlers::orders::routes())
        .nest("/admin", handlers::admin::routes())
}

/// Builds the complete application router with middleware applied.
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health))
        .merge(openapi::swagger_ui())
        .nest("/api/v1", api_v1_routes())
        .layer(Extension(state.auth.clone()))
        .layer(axum::middleware::from_fn(
            request_id::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.has_cors_allowed_origins() {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|origin| {
                let trimmed = origin.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match HeaderValue::from_str(trimmed) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin {:?}", trimmed);
                        None
                    }
                }
            })
            .collect();

        let layer = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                http::Method::GET,
                http::Method::POST,
                http::Method::PUT,
                http::Method::PATCH,
                http::Method::DELETE,
            ])
            .allow_headers([
                http::header::AUTHORIZATION,
                http::header::CONTENT_TYPE,
                http::HeaderName::from_static("x-session-id"),
                http::HeaderName::from_static("x-request-id"),
            ]);
        if config.cors_allow_credentials {
            layer.allow_credentials(true)
        } else {
            layer
        }
    } else if config.should_allow_permissive_cors() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => Json(json!({ "status": "ok", "database": "up" })).into_response(),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
                .into_response()
        }
    }
}

async fn api_status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
    }))
}
