//! C7: Token Cache — client-credentials OAuth2 flow against Azure AD, with
//! in-flight refresh coalescing. See `spec.md` §4.7.

use chrono::Utc;
use ingest_core::config::AzureAuthConfig;
use ingest_core::error::IngestError;
use ingest_core::token::Token;
use serde::Deserialize;

use crate::internal_events::{emit, TokenRefreshFailed, TokenRefreshed};

const SCOPE: &str = "https://monitor.azure.com/.default";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Caches one Azure AD bearer token, refreshing on miss or expiry. Holding
/// a `tokio::sync::Mutex` across the refresh's `.await` is what gives
/// concurrent callers the "coalesce onto a single in-flight request"
/// guarantee from `spec.md` §4.7: the second caller blocks on the lock and,
/// once it acquires it, observes the token the first caller just installed.
pub struct TokenCache {
    client: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cached: tokio::sync::Mutex<Option<Token>>,
}

impl TokenCache {
    pub fn new(auth: &AzureAuthConfig) -> Self {
        Self::with_authority(auth, DEFAULT_AUTHORITY)
    }

    pub fn with_authority(auth: &AzureAuthConfig, authority: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            authority: authority.to_owned(),
            tenant_id: auth.tenant_id.clone(),
            client_id: auth.client_id.clone(),
            client_secret: auth.client_secret.clone(),
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, refreshing if none is cached or the
    /// cached one is within 60 seconds of expiry.
    pub async fn get_token(&self) -> Result<Token, IngestError> {
        let mut guard = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = guard.as_ref() {
            if !token.is_expired(now) {
                return Ok(token.clone());
            }
        }
        let token = self.fetch_token().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Forces the next [`TokenCache::get_token`] call to refresh. Used by
    /// the Sink Client after a 401, per `spec.md` §4.6/§4.8.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<Token, IngestError> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| {
                emit(TokenRefreshFailed {
                    error: e.to_string(),
                });
                IngestError::Authentication {
                    message: format!("token request failed: {e}"),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| format!("{} ({})", e.error_description, e.error))
                .unwrap_or(body);
            emit(TokenRefreshFailed {
                error: format!("{status}: {detail}"),
            });
            return Err(IngestError::Authentication {
                message: format!("token endpoint returned {status}: {detail}"),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            emit(TokenRefreshFailed {
                error: e.to_string(),
            });
            IngestError::Authentication {
                message: format!("malformed token response: {e}"),
            }
        })?;

        emit(TokenRefreshed {
            expires_in_secs: body.expires_in,
        });
        Ok(Token::from_expires_in(body.access_token, body.expires_in, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth() -> AzureAuthConfig {
        AzureAuthConfig {
            tenant_id: "tenant-1".into(),
            client_id: "client-1".into(),
            client_secret: "secret".into(),
        }
    }

    #[tokio::test]
    async fn fetches_and_caches_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok1", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = TokenCache::with_authority(&auth(), &server.uri());
        let first = cache.get_token().await.unwrap();
        let second = cache.get_token().await.unwrap();
        assert_eq!(first.access_token, "tok1");
        assert_eq!(second.access_token, "tok1");
    }

    #[tokio::test]
    async fn invalidation_forces_a_fresh_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok1", "expires_in": 3600})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok2", "expires_in": 3600})),
            )
            .mount(&server)
            .await;

        let cache = TokenCache::with_authority(&auth(), &server.uri());
        let first = cache.get_token().await.unwrap();
        cache.invalidate().await;
        let second = cache.get_token().await.unwrap();
        assert_eq!(first.access_token, "tok1");
        assert_eq!(second.access_token, "tok2");
    }

    #[tokio::test]
    async fn non_2xx_surfaces_authentication_error_without_caching() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "bad secret"
            })))
            .mount(&server)
            .await;

        let cache = TokenCache::with_authority(&auth(), &server.uri());
        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, IngestError::Authentication { .. }));
    }
}
