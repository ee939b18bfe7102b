//! Fake login server for integration tests.
//!
//! Signs provider access tokens with the fixture RSA keys and serves the
//! token and key-set endpoints through wiremock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use eveauth_core::auth::jwt::SessionIssuer;
use eveauth_core::config::SsoConfig;
use eveauth_core::profiles::MemoryProfileStore;
use eveauth_core::sso::flow::SsoFlow;
use eveauth_core::sso::identity::NoGroupSync;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "3rd-party-client";
pub const CLIENT_SECRET: &str = "client-secret";
pub const CALLBACK_URL: &str = "https://app.example/auth/callback";
pub const SESSION_SECRET: &[u8] = b"integration-session-secret";

pub const KID_A: &str = "JWT-Signature-Key-A";
pub const KID_B: &str = "JWT-Signature-Key-B";

pub const KEY_A_PEM: &[u8] = include_bytes!("../fixtures/provider_key_a.pem");
pub const KEY_A_PUB_PEM: &[u8] = include_bytes!("../fixtures/provider_key_a_pub.pem");
pub const KEY_B_PEM: &[u8] = include_bytes!("../fixtures/provider_key_b.pem");

const KEY_A_N: &str = "zj6Ni-3lJfze5zdPhBaINVlvahPR1AHs1vjOKZZyU1EkjTnXr3n01xvkhVba5WTSmYWHYgR0r-WuxJcw7t1WgZ-sTo75T4aeNsAQzg24Z7bDViil3b4TtB11fQf43N6tabej4NSTQKgCKN3fWen1ziTv1OQpmprfaU0QQDcaVTa2FJ4MDaE47VVh6_mHd2Cij6wnMU6YcA5TvdP0N3Y3m65zohEW85_dmPUv7M-PJ4rKDH6_me31_BKVG_mMuzXlHc46HTrBkQtIn4j8rPmlGOUQKtnrmEyyB0D1D2LPQJz6NA3HyF0m6X5PERPZuTwvCt3TsTqS47_8FQf74OYAiQ";
const KEY_B_N: &str = "sv4USYPmqiGM3oXsnsV6_3u6vIAreZjRR_I67dPFkXuE_RB4ElJhvCA5SwP9gzIDl8SId7u_hZzkS0RxwBTV_NyDKIOGBmMt5CO7SsBX3O5rJPyFHvZeAzNjAd-1wwfQMopefpjU7ZfSCGfThIRK2YBOieEvPtE2wTGOhRMoD46S15TNuohX6eZsHV8NLISYHr0QuqiYSVhOfZDrAKK3nMEwuBUaw-BSXeHv0w7uh_jQF8X1PwGn_WQguyCq_2j7ZLqU4YRqZ9PEQpHqE8qXIeSKZrhirm-tPt2NLHGNTUdTBS_kJjkOYcumUIFb1VlZlSW7d6i_LzHW9VY7foVwrQ";

/// Signing key of the fake provider.
#[derive(Debug, Clone, Copy)]
pub enum ProviderKey {
    A,
    B,
}

impl ProviderKey {
    pub fn kid(self) -> &'static str {
        match self {
            ProviderKey::A => KID_A,
            ProviderKey::B => KID_B,
        }
    }

    fn pem(self) -> &'static [u8] {
        match self {
            ProviderKey::A => KEY_A_PEM,
            ProviderKey::B => KEY_B_PEM,
        }
    }

    pub fn jwk(self) -> Value {
        let n = match self {
            ProviderKey::A => KEY_A_N,
            ProviderKey::B => KEY_B_N,
        };
        json!({ "kty": "RSA", "use": "sig", "alg": "RS256", "kid": self.kid(), "n": n, "e": "AQAB" })
    }
}

/// Published key set. Always carries a symmetric record and a junk record,
/// both of which must be ignored.
pub fn key_set(keys: &[ProviderKey]) -> Value {
    let mut records: Vec<Value> = keys.iter().map(|k| k.jwk()).collect();
    records.push(json!({ "kty": "oct", "kid": "shared-secret", "alg": "HS256", "k": "c2VjcmV0" }));
    records.push(json!({ "kty": "unknown", "kid": "junk" }));
    json!({ "keys": records, "SkipUnresolvedJsonWebKeys": true })
}

/// Sign arbitrary claims with a fixture key.
pub fn sign(key: ProviderKey, claims: &Value) -> String {
    sign_with_kid(key, key.kid(), claims)
}

/// Sign with a fixture key but label the header with any key id.
pub fn sign_with_kid(key: ProviderKey, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let encoding = EncodingKey::from_rsa_pem(key.pem()).expect("fixture key");
    encode(&header, claims, &encoding).expect("sign fixture token")
}

/// Forge an HS256 token keyed with the provider's public key material.
pub fn sign_hs256_with_public_key(claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID_A.to_string());
    encode(&header, claims, &EncodingKey::from_secret(KEY_A_PUB_PEM)).expect("sign hs256")
}

pub fn character_name(character_id: i64) -> String {
    format!("Pilot {character_id}")
}

/// A running fake login server.
pub struct Provider {
    pub server: MockServer,
}

impl Provider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Config against this server. Unknown key ids always refetch.
    pub fn config(&self) -> SsoConfig {
        let mut config = SsoConfig::new(CLIENT_ID, CLIENT_SECRET, CALLBACK_URL)
            .with_login_base(&self.server.uri());
        config.jwks_refetch_cooldown = Duration::ZERO;
        config
    }

    /// Claims the provider puts into a character access token.
    pub fn claims(&self, character_id: i64) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "scp": ["publicData", "esi-skills.read_skills.v1"],
            "jti": format!("jti-{character_id}-{now}"),
            "kid": KID_A,
            "sub": format!("CHARACTER:EVE:{character_id}"),
            "azp": CLIENT_ID,
            "tenant": "tranquility",
            "tier": "live",
            "region": "world",
            "aud": [CLIENT_ID, "EVE Online"],
            "name": character_name(character_id),
            "owner": format!("owner-{character_id}"),
            "exp": now + 1200,
            "iat": now,
            "iss": self.issuer(),
        })
    }

    pub fn access_token(&self, character_id: i64) -> String {
        sign(ProviderKey::A, &self.claims(character_id))
    }

    pub async fn mount_jwks(&self, keys: &[ProviderKey]) {
        Mock::given(method("GET"))
            .and(path("/oauth/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set(keys)))
            .mount(&self.server)
            .await;
    }

    /// Answer the authorization-code grant for `code` with a token for `character_id`.
    pub async fn mount_code_exchange(&self, code: &str, character_id: i64) {
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(
                &self.access_token(character_id),
                Some(&format!("rt-{character_id}")),
            )))
            .mount(&self.server)
            .await;
    }

    /// Answer the refresh grant for `refresh_token`.
    pub async fn mount_refresh(&self, refresh_token: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub fn flow(&self, store: Arc<MemoryProfileStore>) -> SsoFlow {
        SsoFlow::new(
            self.config(),
            store,
            Arc::new(NoGroupSync),
            SessionIssuer::new(SESSION_SECRET),
        )
        .expect("flow")
    }
}

pub fn token_response(access_token: &str, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": access_token,
        "expires_in": 1199,
        "token_type": "Bearer",
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = json!(rt);
    }
    body
}

pub fn invalid_grant() -> ResponseTemplate {
    ResponseTemplate::new(400).set_body_json(json!({
        "error": "invalid_grant",
        "error_description": "Invalid refresh token. Token missing/expired.",
    }))
}
