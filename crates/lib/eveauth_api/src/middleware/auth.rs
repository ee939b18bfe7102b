//! Authentication middleware: session token extraction and verification.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use eveauth_core::models::auth::SessionClaims;

use crate::AppState;
use crate::error::AppError;
use crate::services::session::session_token;

/// Verified session claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionClaims);

/// Axum middleware: takes the session from `Authorization: Bearer <token>`
/// or the session cookie, verifies it and injects [`AuthenticatedUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let jar = CookieJar::from_headers(request.headers());
    let token = session_token(request.headers(), &jar)
        .ok_or_else(|| AppError::Unauthorized("Missing session".into()))?;

    let claims = state.sso.verify_session(&token)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));

    Ok(next.run(request).await)
}
