//! Outbound calls to the provider's OAuth2 endpoints.
//!
//! Authorize-URL construction is local. Code exchange and refresh are
//! form-encoded POSTs authenticated with the client credentials over HTTP
//! Basic. Nothing here retries: callers decide what a failure means.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::SsoError;
use crate::config::SsoConfig;
use crate::models::profile::ExternalCredential;

/// OAuth2 error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client for the provider's token endpoint.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: Arc<SsoConfig>,
}

impl ProviderClient {
    /// Build a client whose every request is bounded by `config.http_timeout`.
    pub fn new(config: Arc<SsoConfig>) -> Result<Self, SsoError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("eveauth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SsoError::Protocol(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// The underlying HTTP client, shared with the JWKS verifier.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn config(&self) -> &SsoConfig {
        &self.config
    }

    /// Build the provider's authorize URL for a login attempt.
    pub fn authorization_url(&self, state: &str, with_full_scopes: bool) -> Result<String, SsoError> {
        let scopes = self.config.scopes(with_full_scopes).join(" ");
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("scope", scopes.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| SsoError::Protocol(format!("authorize url: {e}")))?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<ExternalCredential, SsoError> {
        self.token_request(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    /// Run the refresh grant for a stored refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<ExternalCredential, SsoError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<ExternalCredential, SsoError> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let credential = resp.json::<ExternalCredential>().await?;
        if credential.access_token.is_empty() {
            return Err(SsoError::Protocol("token response without access_token".into()));
        }
        debug!(expires_in = credential.expires_in, "token endpoint answered");
        Ok(credential)
    }
}

/// Map a non-2xx token endpoint answer onto the error taxonomy.
fn classify_failure(status: reqwest::StatusCode, body: &str) -> SsoError {
    if status.is_server_error() {
        return SsoError::Transient(format!("token endpoint HTTP {status}"));
    }
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(err) if err.error == "invalid_grant" => SsoError::InvalidGrant(
            err.error_description
                .unwrap_or_else(|| "invalid_grant".to_string()),
        ),
        Ok(err) => SsoError::Protocol(format!("token endpoint HTTP {status}: {}", err.error)),
        Err(_) => SsoError::Protocol(format!("token endpoint HTTP {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ProviderClient {
        let config = SsoConfig::new("client-id", "client-secret", "https://app.example/callback")
            .with_login_base(&server.uri());
        ProviderClient::new(Arc::new(config)).unwrap()
    }

    #[test]
    fn authorization_url_carries_all_parameters() {
        let config = SsoConfig::new("client-id", "client-secret", "https://app.example/callback");
        let client = ProviderClient::new(Arc::new(config)).unwrap();
        let url = Url::parse(&client.authorization_url("st4te", false).unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/v2/oauth/authorize");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["redirect_uri"], "https://app.example/callback");
        assert_eq!(params["scope"], "publicData");
        assert_eq!(params["state"], "st4te");
    }

    #[test]
    fn full_scope_flag_requests_registration_scopes() {
        let config = SsoConfig::new("client-id", "client-secret", "https://app.example/callback");
        let client = ProviderClient::new(Arc::new(config)).unwrap();
        let url = Url::parse(&client.authorization_url("s", true).unwrap()).unwrap();
        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(scope.contains("esi-skills.read_skills.v1"));
    }

    #[tokio::test]
    async fn exchange_code_posts_form_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expires_in": 1199,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = client_for(&server).exchange_code("the-code").await.unwrap();
        assert_eq!(credential.access_token, "at");
        assert_eq!(credential.refresh_token.as_deref(), Some("rt"));
        assert_eq!(credential.expires_in, 1199);
    }

    #[tokio::test]
    async fn invalid_grant_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid refresh token. Token missing/expired."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("stale").await.unwrap_err();
        assert!(matches!(err, SsoError::InvalidGrant(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange_code("c").await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client_for(&server).exchange_code("c").await.unwrap_err();
        assert!(matches!(err, SsoError::Protocol(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn hung_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)))
            .mount(&server)
            .await;

        let mut config = SsoConfig::new("id", "secret", "cb").with_login_base(&server.uri());
        config.http_timeout = std::time::Duration::from_millis(100);
        let client = ProviderClient::new(Arc::new(config)).unwrap();
        let err = client.exchange_code("c").await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }
}
