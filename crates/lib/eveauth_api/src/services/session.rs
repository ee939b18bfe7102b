//! Locating the caller's session token.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::CookieJar;
use eveauth_core::models::auth::SessionClaims;
use eveauth_core::sso::flow::SsoFlow;

use super::cookies::SESSION_COOKIE;

/// Session token from `Authorization: Bearer`, falling back to the cookie.
pub fn session_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Claims of the caller's session, if they present a valid one.
pub fn current_session(sso: &SsoFlow, headers: &HeaderMap, jar: &CookieJar) -> Option<SessionClaims> {
    let token = session_token(headers, jar)?;
    sso.verify_session(&token).ok()
}

/// User id to link a new character to, taken from a still-valid session.
pub fn linking_hint(sso: &SsoFlow, headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    current_session(sso, headers, jar).map(|claims| claims.sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum_extra::extract::cookie::Cookie;

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "from-cookie"));
        assert_eq!(session_token(&headers, &jar).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_is_used_without_bearer() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "from-cookie"));
        assert_eq!(
            session_token(&HeaderMap::new(), &jar).as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(session_token(&headers, &CookieJar::new()), None);
    }
}
