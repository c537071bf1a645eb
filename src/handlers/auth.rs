use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;

use crate::{
    auth::{
        AuthError, AuthResponse, AuthUser, ChangePasswordRequest, LoginCredentials,
        RefreshTokenRequest, RegisterRequest, UpdateProfileRequest, UserResponse,
    },
    auth::AuthRouterExt,
    errors::ApiError,
    events::Event,
    handlers::common::validate_input,
    AppState,
};

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh));

    let protected = Router::new()
        .route("/profile", get(profile).put(update_profile))
        .route("/change-password", post(change_password))
        .with_auth();

    public.merge(protected)
}

/// Create an account and sign in
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    responses(
        (status = 201, description = "Account created, token pair issued"),
        (status = 400, description = "Validation failure or email in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&request)?;

    let (user, tokens) = state
        .auth
        .register(request)
        .await
        .map_err(map_auth_error)?;

    state
        .event_sender
        .send_or_log(Event::UserRegistered(user.id))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(user),
            tokens,
        }),
    ))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    responses(
        (status = 200, description = "Token pair issued"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&credentials)?;

    let (user, tokens) = state
        .auth
        .login(&credentials.email, &credentials.password)
        .await
        .map_err(map_auth_error)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(user),
        tokens,
    }))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "New token pair issued"),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tokens = state
        .auth
        .refresh_token(&request.refresh_token)
        .await
        .map_err(map_auth_error)?;
    Ok(Json(tokens))
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/v1/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .auth
        .get_user(auth_user.user_id)
        .await
        .map_err(map_auth_error)?;
    Ok(Json(UserResponse::from(user)))
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&request)?;

    let user = state
        .auth
        .update_profile(auth_user.user_id, request)
        .await
        .map_err(map_auth_error)?;
    Ok(Json(UserResponse::from(user)))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&request)?;

    state
        .auth
        .change_password(auth_user.user_id, request)
        .await
        .map_err(map_auth_error)?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}

fn map_auth_error(err: AuthError) -> ApiError {
    match err {
        AuthError::EmailInUse | AuthError::PasswordMismatch => {
            ApiError::ValidationError(err.to_string())
        }
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::TokenExpired
        | AuthError::MissingAuth => ApiError::Unauthorized,
        AuthError::UserNotFound => ApiError::NotFound("User not found".to_string()),
        _ => ApiError::InternalServerError,
    }
}
