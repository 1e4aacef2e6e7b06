use axum::{Router, routing::post};

use crate::api::v1::handlers::auth;
use crate::services::cache::CacheClient;
use crate::state::AppState;

pub fn routes<C: CacheClient>() -> Router<AppState<C>> {
    Router::new()
        .route("/auth/login", post(auth::login::<C>))
        .route("/auth/logout", post(auth::logout::<C>))
        .route("/auth/logout-all", post(auth::logout_all::<C>))
        .route("/auth/refresh", post(auth::refresh::<C>))
        .route("/auth/validate", post(auth::validate::<C>))
}
