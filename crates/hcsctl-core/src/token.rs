//! Password token authentication
//!
//! Accounts without an access key authenticate with user name and password.
//! The identity service answers `POST /v3/auth/tokens` with the token in the
//! `X-Subject-Token` header; the token is then sent as `X-Auth-Token` until it
//! is close to expiry or the server rejects it.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde_json::{Value, json};
use std::fmt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::credentials::{AuthMethod, Credentials};
use crate::endpoint::EndpointResolver;
use crate::error::{CoreError, ErrorClassification, Result};
use crate::request::ApiRequest;

pub const SUBJECT_TOKEN_HEADER: &str = "x-subject-token";
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Tokens are renewed this long before the server-side expiry
const REFRESH_MARGIN_SECS: i64 = 300;

/// Lifetime assumed when the server omits `expires_at`
const DEFAULT_LIFETIME_SECS: i64 = 3600;

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Fetches and caches a project-scoped token
pub struct TokenAuth {
    user: String,
    password: String,
    domain: String,
    project_id: Option<String>,
    token_url: Url,
    http: Client,
    cache: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuth")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("token_url", &self.token_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TokenAuth {
    pub fn new(credentials: &Credentials, resolver: &EndpointResolver, http: Client) -> Result<Self> {
        let AuthMethod::Password {
            user,
            password,
            domain,
        } = credentials.auth()
        else {
            return Err(CoreError::Credential(
                "token authentication needs user, password and domain".to_string(),
            ));
        };

        let token_url = resolver.resolve(&ApiRequest::post("iam", "auth/tokens"))?;

        Ok(Self {
            user: user.clone(),
            password: password.clone(),
            domain: domain.clone(),
            project_id: credentials.project_id().map(str::to_string),
            token_url,
            http,
            cache: Mutex::new(None),
        })
    }

    /// Current token, fetching a new one when the cached one is stale.
    ///
    /// The cache lock is held across the fetch so concurrent callers share a
    /// single exchange.
    pub async fn token(&self, cancel: &CancellationToken) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.is_fresh(Utc::now())
        {
            return Ok(cached.value.clone());
        }

        let fresh = self.fetch(cancel).await?;
        let value = fresh.value.clone();
        *cache = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call re-authenticates
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<CachedToken> {
        debug!(user = %self.user, url = %self.token_url, "Requesting IAM token");

        let body = self.request_body();
        let send = self.http.post(self.token_url.clone()).json(&body).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            r = send => r.map_err(|e| CoreError::Network {
                product: "iam".to_string(),
                operation: "POST auth/tokens".to_string(),
                message: e.to_string(),
            })?,
        };

        let status = response.status();
        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.map_err(|e| CoreError::Network {
            product: "iam".to_string(),
            operation: "POST auth/tokens".to_string(),
            message: e.to_string(),
        })?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            let classification = ErrorClassification::classify(status.as_u16(), &payload);
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(CoreError::Auth {
                    product: "iam".to_string(),
                    message: classification.message,
                });
            }
            return Err(CoreError::Api {
                product: "iam".to_string(),
                operation: "POST auth/tokens".to_string(),
                classification,
            });
        }

        let value = token.filter(|t| !t.is_empty()).ok_or_else(|| CoreError::Protocol {
            product: "iam".to_string(),
            message: "token response carries no X-Subject-Token header".to_string(),
        })?;

        let expires_at = payload
            .pointer("/token/expires_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| {
                warn!("IAM token response has no usable expires_at, assuming one hour");
                Utc::now() + ChronoDuration::seconds(DEFAULT_LIFETIME_SECS)
            });

        debug!(%expires_at, "Obtained IAM token");
        Ok(CachedToken { value, expires_at })
    }

    fn request_body(&self) -> Value {
        let scope = match &self.project_id {
            Some(project) => json!({"project": {"id": project}}),
            None => json!({"domain": {"name": self.domain}}),
        };
        json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.user,
                            "password": self.password,
                            "domain": {"name": self.domain}
                        }
                    }
                },
                "scope": scope
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token_auth(server: &MockServer) -> TokenAuth {
        let creds = Credentials::password("admin", "pw", "corp", "hcs.example.com")
            .unwrap()
            .with_project("proj");
        let resolver = EndpointResolver::builtin(&creds)
            .with_override("iam", &server.uri())
            .unwrap();
        TokenAuth::new(&creds, &resolver, Client::new()).unwrap()
    }

    fn token_response(token: &str, expires_at: &str) -> ResponseTemplate {
        ResponseTemplate::new(201)
            .insert_header("X-Subject-Token", token)
            .set_body_json(json!({"token": {"expires_at": expires_at}}))
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": "proj"}}}})))
            .respond_with(token_response("tok-1", "2999-01-01T00:00:00.000000Z"))
            .expect(1)
            .mount(&server)
            .await;

        let auth = token_auth(&server);
        let cancel = CancellationToken::new();
        assert_eq!(auth.token(&cancel).await.unwrap(), "tok-1");
        assert_eq!(auth.token(&cancel).await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        let server = MockServer::start().await;
        let soon = (Utc::now() + ChronoDuration::seconds(60)).to_rfc3339();
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(token_response("tok-short", &soon))
            .expect(2)
            .mount(&server)
            .await;

        let auth = token_auth(&server);
        let cancel = CancellationToken::new();
        auth.token(&cancel).await.unwrap();
        auth.token(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(token_response("tok", "2999-01-01T00:00:00Z"))
            .expect(2)
            .mount(&server)
            .await;

        let auth = token_auth(&server);
        let cancel = CancellationToken::new();
        auth.token(&cancel).await.unwrap();
        auth.invalidate().await;
        auth.token(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_password_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(
                json!({"error": {"code": "401", "message": "The request you have made requires authentication."}}),
            ))
            .mount(&server)
            .await;

        let err = token_auth(&server)
            .token(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Auth { .. }));
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_missing_subject_token_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"token": {}})))
            .mount(&server)
            .await;

        let err = token_auth(&server)
            .token(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Protocol { .. }));
    }
}
