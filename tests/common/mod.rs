use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use tower::ServiceExt;

use printpro_api::{
    auth::AuthUser,
    build_app,
    config::AppConfig,
    db,
    entities::{category, product, product_variant, user},
    events::EventSender,
    AppState,
};

/// A fully wired application backed by a throwaway SQLite file.
pub struct TestApp {
    pub state: AppState,
    pub router: axum::Router,
    _tmp: tempfile::TempDir,
}

pub async fn spawn_app() -> TestApp {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_path = tmp.path().join("test.db");

    let mut config = AppConfig::new(
        format!("sqlite://{}?mode=rwc", db_path.display()),
        "integration-test-secret-0123456789-0123456789-0123456789-0123456789".to_string(),
        3600,
        86_400,
        "127.0.0.1".to_string(),
        0,
        "development".to_string(),
    );
    config.upload_dir = tmp.path().join("uploads").display().to_string();
    config.db_max_connections = 1;
    config.db_min_connections = 1;

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .expect("connect"),
    );
    db::run_migrations(&db).await.expect("migrations");

    let (tx, mut rx) = mpsc::channel(64);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let event_sender = Arc::new(EventSender::new(tx));

    let state = AppState::new(db, Arc::new(config), event_sender);
    let router = build_app(state.clone());

    TestApp {
        state,
        router,
        _tmp: tmp,
    }
}

impl TestApp {
    /// Fires one request at the router and returns status plus parsed body.
    pub async fn request(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    pub async fn seed_category(&self, name: &str, slug: &str) -> category::Model {
        category::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            description: Set(String::new()),
            image_url: Set(None),
            is_active: Set(true),
            sort_order: Set(0),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed category")
    }

    pub async fn seed_product(
        &self,
        name: &str,
        slug: &str,
        price: Decimal,
        sale_price: Option<Decimal>,
    ) -> product::Model {
        product::ActiveModel {
            category_id: Set(None),
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            sku: Set(None),
            description: Set(String::new()),
            short_description: Set(String::new()),
            price: Set(price),
            sale_price: Set(sale_price),
            main_image_url: Set(None),
            is_active: Set(true),
            is_featured: Set(false),
            stock_quantity: Set(100),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: i64,
        name: &str,
        price_adjustment: Decimal,
    ) -> product_variant::Model {
        product_variant::ActiveModel {
            product_id: Set(product_id),
            name: Set(name.to_string()),
            sku: Set(None),
            price_adjustment: Set(price_adjustment),
            stock_quantity: Set(100),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed variant")
    }

    /// Registers an account and returns (user, access token).
    pub async fn register_user(&self, email: &str) -> (user::Model, String) {
        let (user, tokens) = self
            .state
            .auth
            .register(printpro_api::auth::RegisterRequest {
                email: email.to_string(),
                password: "test-password".to_string(),
                password_confirm: "test-password".to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
            })
            .await
            .expect("register");
        (user, tokens.access_token)
    }

    /// Registers an account, promotes it to staff and returns a fresh token
    /// carrying the staff claim.
    pub async fn register_staff(&self, email: &str) -> (user::Model, String) {
        let (user, _) = self.register_user(email).await;

        let mut active: user::ActiveModel = user.into();
        active.is_staff = Set(true);
        let user = active.update(&*self.state.db).await.expect("promote");

        let tokens = self.state.auth.generate_token(&user).expect("token");
        (user, tokens.access_token)
    }
}

pub fn auth_user_for(user: &user::Model) -> AuthUser {
    AuthUser {
        user_id: user.id,
        name: Some(user.full_name()),
        email: Some(user.email.clone()),
        is_staff: user.is_staff,
        token_id: "test".to_string(),
    }
}
