//! Login, session and character handlers.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use eveauth_core::models::auth::IssuedSession;
use eveauth_core::models::profile::UserProfile;
use eveauth_core::sso::flow::LoginError;
use tracing::debug;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CallbackQuery, LoginQuery, LogoutResponse, MobileTokenRequest, SessionInfo, SessionResponse,
};
use crate::services::cookies::{
    LOGIN_STATE_COOKIE, clear_login_state_cookie, clear_session_cookie, login_state_cookie,
    session_cookie,
};
use crate::services::session::linking_hint;

/// `GET /auth/login` — redirect to the provider's authorize page.
///
/// A caller who already holds a valid session has the new character linked
/// to their user. The issued state is also set as a cookie so the callback
/// only completes in this browser.
pub async fn login_handler(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> AppResult<(CookieJar, Redirect)> {
    let hint = linking_hint(&state.sso, &headers, &jar);
    let redirect = state.sso.initiate_login(query.full, hint)?;
    let cookie = login_state_cookie(
        &redirect.state,
        i64::try_from(state.sso.config().state_ttl.as_secs()).unwrap_or(i64::MAX),
        state.config.secure_cookies,
    );
    Ok((jar.add(cookie), Redirect::to(&redirect.authorization_url)))
}

/// `GET /auth/callback` — finish the login and set the session cookie.
///
/// The linking hint comes only from the state issued at `/auth/login`.
pub async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let started_here = !query.state.is_empty()
        && jar
            .get(LOGIN_STATE_COOKIE)
            .is_some_and(|c| c.value() == query.state);
    if !started_here {
        // Burn the state so the link is dead everywhere.
        if !query.state.is_empty() {
            let _ = state.sso.state_store().validate_and_consume(&query.state);
        }
        return Err(LoginError::InvalidState.into());
    }

    let outcome = state
        .sso
        .handle_callback(&query.code, &query.state, None)
        .await?;

    let secure = state.config.secure_cookies;
    let cookie = session_cookie(&outcome.session.token, seconds_until(&outcome.session), secure);
    let jar = jar.add(cookie).add(clear_login_state_cookie(secure));
    Ok((jar, Json(SessionResponse::from(outcome))))
}

/// `POST /auth/mobile` — trade a natively obtained provider token for a session.
pub async fn mobile_handler(
    State(state): State<AppState>,
    Json(body): Json<MobileTokenRequest>,
) -> AppResult<Json<SessionResponse>> {
    let outcome = state
        .sso
        .exchange_mobile_token(&body.access_token, body.refresh_token)
        .await?;
    Ok(Json(SessionResponse::from(outcome)))
}

/// `GET /auth/session` — the caller's session claims.
pub async fn session_handler(
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> Json<SessionInfo> {
    Json(SessionInfo::from(claims))
}

/// `GET /auth/characters` — every character linked to the caller's user.
pub async fn characters_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<UserProfile>>> {
    let characters = state.sso.characters_for_user(claims.user_id()).await?;
    debug!(user_id = %claims.sub, count = characters.len(), "listed characters");
    Ok(Json(characters))
}

/// `POST /auth/logout` — drop the session cookie.
///
/// Session tokens are stateless; a copied token stays valid until it expires.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    (
        jar.add(clear_session_cookie(state.config.secure_cookies)),
        Json(LogoutResponse { success: true }),
    )
}

fn seconds_until(session: &IssuedSession) -> i64 {
    (session.expires_at - Utc::now()).num_seconds()
}
