//! # eveauth_api
//!
//! HTTP adapter for the EVE SSO identity core. Handlers only parse input,
//! pick up the caller's session as a linking hint and map core errors.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use eveauth_core::sso::flow::SsoFlow;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sso: Arc<SsoFlow>,
    pub config: ApiConfig,
}

impl AppState {
    pub fn new(sso: Arc<SsoFlow>, config: ApiConfig) -> Self {
        Self { sso, config }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `eveauth_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    eveauth_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_AUTH_LOGIN, get(auth::login_handler))
        .route(routes::GET_AUTH_CALLBACK, get(auth::callback_handler))
        .route(routes::POST_AUTH_MOBILE, post(auth::mobile_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler));

    // Protected routes (require a session)
    let protected = Router::new()
        .route(routes::GET_AUTH_SESSION, get(auth::session_handler))
        .route(routes::GET_AUTH_CHARACTERS, get(auth::characters_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
