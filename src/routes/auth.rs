//! Account API endpoints
//!
//! - POST /api/auth/register
//! - POST /api/auth/login
//! - POST /api/auth/logout
//! - GET  /api/auth/me

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::{AuthService, AuthUser, LoginRequest, LoginResponse, RegisterRequest};
use crate::db::{UserProfile, UserRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let request = json_body(payload)?;
    let user = AuthService::new(state.db(), state.tokens())
        .register(&request)
        .await?;

    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let request = json_body(payload)?;
    let response = AuthService::new(state.db(), state.tokens())
        .login(&request)
        .await?;

    Ok(Json(response))
}

/// Tokens are stateless; the client discards its copy
async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    })
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>> {
    let record = UserRepository::new(state.db())
        .get(&user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    Ok(Json(UserProfile::from(&record)))
}
