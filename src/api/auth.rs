// Auth API Endpoints

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{ApiState, AuthSubject};
use crate::error::WalletError;

/// Auth routes. Register/login/refresh are public; logout needs the bearer
/// token to know which subject to revoke.
pub fn routes(state: ApiState) -> Router<ApiState> {
    let protected = Router::new()
        .route("/logout", post(logout))
        .layer(middleware::from_fn_with_state(state, super::auth_middleware));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .merge(protected)
}

// Request/Response DTOs

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    user_id: String,
    username: String,
    email: String,
    message: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Serialize)]
struct LogoutResponse {
    message: String,
}

// Endpoint handlers

async fn register(
    State(state): State<ApiState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), WalletError> {
    let user = state
        .auth
        .register(&req.username, &req.email, &req.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            message: "User registered successfully".to_string(),
        }),
    ))
}

async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, WalletError> {
    let tokens = state.auth.login(&req.username, &req.password).await?;

    Ok(Json(LoginResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token.unwrap_or_default(),
        expires_in: tokens.expires_in,
    }))
}

async fn refresh(
    State(state): State<ApiState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, WalletError> {
    let tokens = state.auth.refresh(&req.refresh_token).await?;

    Ok(Json(RefreshResponse {
        access_token: tokens.access_token,
        expires_in: tokens.expires_in,
    }))
}

/// Protected: the subject comes from the presented bearer token. Revocation
/// downstream is best-effort and the endpoint always reports success.
async fn logout(
    State(state): State<ApiState>,
    Extension(AuthSubject(subject)): Extension<AuthSubject>,
) -> Result<Json<LogoutResponse>, WalletError> {
    state.auth.logout(&subject).await?;

    Ok(Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}
