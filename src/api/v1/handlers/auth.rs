/*
 * Responsibility
 * - POST /auth/{login,logout,logout-all,refresh,validate}
 * - thin: DTO <-> LoginService, errors through AppError
 */
use axum::Json;
use axum::extract::State;

use crate::api::v1::dto::{
    login::LoginRequest,
    logout::LogoutResponse,
    refresh::RefreshRequest,
    token_response::TokenPairResponse,
    validate::{ValidateRequest, ValidateResponse},
};
use crate::api::v1::extractors::BearerToken;
use crate::error::AppError;
use crate::services::cache::CacheClient;
use crate::state::AppState;

pub async fn login<C: CacheClient>(
    State(state): State<AppState<C>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    if req.login.is_empty() || req.password.is_empty() {
        return Err(AppError::bad_request(
            "INVALID_REQUEST",
            "login and password are required",
        ));
    }

    let pair = state
        .auth
        .login(&req.login, &req.password, req.application_id)
        .await?;

    Ok(Json(pair.into()))
}

pub async fn logout<C: CacheClient>(
    State(state): State<AppState<C>>,
    BearerToken(token): BearerToken,
) -> Result<Json<LogoutResponse>, AppError> {
    let revoked = state.auth.logout(&token).await?;
    Ok(Json(LogoutResponse { revoked }))
}

pub async fn logout_all<C: CacheClient>(
    State(state): State<AppState<C>>,
    BearerToken(token): BearerToken,
) -> Result<Json<LogoutResponse>, AppError> {
    let revoked = state.auth.logout_everywhere(&token).await?;
    Ok(Json(LogoutResponse { revoked }))
}

pub async fn refresh<C: CacheClient>(
    State(state): State<AppState<C>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(pair.into()))
}

/// Always 200; the body carries the verdict.
pub async fn validate<C: CacheClient>(
    State(state): State<AppState<C>>,
    Json(req): Json<ValidateRequest>,
) -> Json<ValidateResponse> {
    Json(state.auth.validate(&req.token).await.into())
}
