//! Session and login-state cookie construction.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "eveauth_session";

/// httpOnly cookie holding a session token for `max_age_secs`.
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(Duration::seconds(max_age_secs.max(0)))
        .build()
}

/// Expired cookie that clears the session.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    session_cookie("", 0, secure)
}

/// Cookie binding an in-flight login state to the browser that started it.
pub const LOGIN_STATE_COOKIE: &str = "eveauth_login_state";

/// Path the login-state cookie is scoped to.
const LOGIN_STATE_PATH: &str = "/auth";

/// httpOnly cookie carrying the state issued by `/auth/login`.
///
/// `Lax` so it rides along on the provider's top-level redirect back.
pub fn login_state_cookie(state: &str, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((LOGIN_STATE_COOKIE.to_string(), state.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(LOGIN_STATE_PATH.to_string())
        .max_age(Duration::seconds(max_age_secs.max(0)))
        .build()
}

/// Expired cookie that clears the login state.
pub fn clear_login_state_cookie(secure: bool) -> Cookie<'static> {
    login_state_cookie("", 0, secure)
}
