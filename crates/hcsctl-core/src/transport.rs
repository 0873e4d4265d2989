//! Signed HTTP transport
//!
//! Executes one logical request: refuses mutating methods on read-only
//! clients, signs every attempt afresh, classifies failures and retries the
//! transient ones (network errors, 5xx, 429) with capped exponential backoff.
//! With token authentication a 401 triggers exactly one re-authentication.

use chrono::Utc;
use reqwest::{Client, Method, NoProxy, Proxy};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::{ProxyConfig, RetryConfig};
use crate::credentials::{AuthMethod, Credentials};
use crate::endpoint::EndpointResolver;
use crate::error::{CoreError, ErrorClassification, Result};
use crate::request::is_mutating;
use crate::signer::{AkSkSigner, SignedRequest};
use crate::token::{AUTH_TOKEN_HEADER, TokenAuth};

/// User agent string for hcsctl HTTP requests
pub const USER_AGENT: &str = concat!("hcsctl/", env!("CARGO_PKG_VERSION"));

const PROJECT_HEADER: &str = "x-project-id";
const DOMAIN_HEADER: &str = "x-domain-id";
const REQUEST_ID_HEADERS: &[&str] = &["x-request-id", "x-openstack-request-id"];

/// How each request proves who sent it
#[derive(Debug)]
pub enum Authenticator {
    AkSk(AkSkSigner),
    Token(TokenAuth),
}

impl Authenticator {
    pub fn from_credentials(
        credentials: &Credentials,
        resolver: &EndpointResolver,
        http: Client,
    ) -> Result<Self> {
        match credentials.auth() {
            AuthMethod::AccessKey { .. } => {
                Ok(Self::AkSk(AkSkSigner::from_credentials(credentials)?))
            }
            AuthMethod::Password { .. } => {
                Ok(Self::Token(TokenAuth::new(credentials, resolver, http)?))
            }
        }
    }

    async fn authorize(
        &self,
        request: &PreparedRequest,
        headers: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<SignedRequest> {
        match self {
            Authenticator::AkSk(signer) => Ok(signer.sign(
                &request.method,
                &request.url,
                &headers,
                &request.body,
                Utc::now(),
            )),
            Authenticator::Token(auth) => {
                let mut headers = headers;
                headers.insert(AUTH_TOKEN_HEADER.to_string(), auth.token(cancel).await?);
                Ok(SignedRequest {
                    method: request.method.clone(),
                    url: request.url.clone(),
                    headers,
                    body: request.body.clone(),
                })
            }
        }
    }
}

/// A request with its URL resolved and its body serialized
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub product: String,
    pub operation: String,
    pub method: Method,
    pub url: Url,
    /// Serialized once; every attempt signs and sends these exact bytes
    pub body: Vec<u8>,
}

impl PreparedRequest {
    pub fn new(product: &str, method: Method, url: Url, body: Option<&Value>) -> Result<Self> {
        let body = match body {
            Some(value) => serde_json::to_vec(value)?,
            None => Vec::new(),
        };
        let operation = format!("{} {}", method, url.path().trim_start_matches('/'));
        Ok(Self {
            product: product.to_string(),
            operation,
            method,
            url,
            body,
        })
    }

    /// Name the operation in errors and logs
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON, `Null` for empty bodies, a string for non-JSON bodies
    pub body: Value,
    pub request_id: Option<String>,
}

/// Transport construction options
#[derive(Debug, Clone, Default)]
pub struct TransportOptions {
    pub read_only: bool,
    pub retry: RetryConfig,
    pub proxy: Option<ProxyConfig>,
    pub request_timeout: Option<Duration>,
}

/// Build the HTTP client shared by the transport and token exchange
pub fn build_http_client(options: &TransportOptions) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);

    if let Some(timeout) = options.request_timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy) = &options.proxy {
        let no_proxy = proxy.no_proxy.as_deref().and_then(NoProxy::from_string);
        if let Some(http) = &proxy.http {
            let p = Proxy::http(http).map_err(|e| {
                CoreError::Configuration(format!("invalid http proxy '{}': {}", http, e))
            })?;
            builder = builder.proxy(p.no_proxy(no_proxy.clone()));
        }
        if let Some(https) = &proxy.https {
            let p = Proxy::https(https).map_err(|e| {
                CoreError::Configuration(format!("invalid https proxy '{}': {}", https, e))
            })?;
            builder = builder.proxy(p.no_proxy(no_proxy));
        }
    }

    builder
        .build()
        .map_err(|e| CoreError::Configuration(format!("cannot build HTTP client: {}", e)))
}

/// Signs, sends and retries requests for one set of credentials
#[derive(Debug)]
pub struct Transport {
    http: Client,
    auth: Authenticator,
    project_id: Option<String>,
    domain_id: Option<String>,
    read_only: bool,
    retry: RetryConfig,
}

impl Transport {
    pub fn new(
        credentials: &Credentials,
        resolver: &EndpointResolver,
        options: &TransportOptions,
    ) -> Result<Self> {
        let http = build_http_client(options)?;
        let auth = Authenticator::from_credentials(credentials, resolver, http.clone())?;
        Ok(Self {
            http,
            auth,
            project_id: credentials.project_id().map(str::to_string),
            domain_id: credentials.domain_id().map(str::to_string),
            read_only: options.read_only,
            retry: options.retry.clone(),
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Execute `request`, retrying transient failures
    pub async fn execute(
        &self,
        request: &PreparedRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        self.run(request, cancel, self.retry.attempts()).await
    }

    /// Execute `request` with a single attempt. Callers that keep their own
    /// retry loop (the job poller) use this so failures are retried once
    /// per layer, not once per layer multiplied.
    pub async fn execute_once(
        &self,
        request: &PreparedRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        self.run(request, cancel, 1).await
    }

    async fn run(
        &self,
        request: &PreparedRequest,
        cancel: &CancellationToken,
        max_attempts: u32,
    ) -> Result<ApiResponse> {
        if self.read_only && is_mutating(&request.method) {
            debug!(method = %request.method, url = %request.url, "Rejected by read-only guard");
            return Err(CoreError::ReadOnlyViolation {
                method: request.method.to_string(),
                url: request.url.to_string(),
            });
        }

        let mut attempt = 0;
        let mut refreshed = false;

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let authorized = self
                .auth
                .authorize(request, self.base_headers(request), cancel)
                .await;

            let outcome = match authorized {
                Ok(signed) => {
                    debug!(
                        product = %request.product,
                        method = %request.method,
                        url = %request.url,
                        attempt = attempt + 1,
                        "Sending request"
                    );
                    self.send(request, signed, cancel).await
                }
                // token exchange failures share the request's retry budget
                Err(error) => Err(error),
            };

            let error = match outcome {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err((status, body))) => {
                    if status == 401 {
                        if let Authenticator::Token(auth) = &self.auth
                            && !refreshed
                        {
                            debug!("Token rejected, re-authenticating once");
                            auth.invalidate().await;
                            refreshed = true;
                            continue;
                        }
                        let classification = ErrorClassification::classify(status, &body);
                        return Err(CoreError::Auth {
                            product: request.product.clone(),
                            message: classification.message,
                        });
                    }
                    CoreError::Api {
                        product: request.product.clone(),
                        operation: request.operation.clone(),
                        classification: ErrorClassification::classify(status, &body),
                    }
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt + 1 >= max_attempts {
                return Err(error);
            }

            let delay = self.retry.delay(attempt);
            warn!(
                product = %request.product,
                operation = %request.operation,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, retrying"
            );
            sleep_or_cancel(delay, cancel).await?;
            attempt += 1;
        }
    }

    fn base_headers(&self, request: &PreparedRequest) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("user-agent".to_string(), USER_AGENT.to_string());
        if let Some(project) = &self.project_id
            && !request.url.path().contains("v3/regions")
        {
            headers.insert(PROJECT_HEADER.to_string(), project.clone());
        }
        if let Some(domain) = &self.domain_id
            && request.url.path().contains("/peering")
        {
            headers.insert(DOMAIN_HEADER.to_string(), domain.clone());
        }
        if !request.body.is_empty() {
            headers.insert("content-type".to_string(), "application/json".to_string());
        }
        headers
    }

    /// One HTTP exchange. The outer error is a transport failure, the inner
    /// one a non-success status with its parsed body.
    async fn send(
        &self,
        request: &PreparedRequest,
        signed: SignedRequest,
        cancel: &CancellationToken,
    ) -> Result<std::result::Result<ApiResponse, (u16, Value)>> {
        let mut builder = self.http.request(signed.method.clone(), signed.url.clone());
        for (name, value) in &signed.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !signed.body.is_empty() {
            builder = builder.body(signed.body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
                .collect();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, text))
        };

        let (status, headers, text) = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            result = exchange => result.map_err(|e| CoreError::Network {
                product: request.product.clone(),
                operation: request.operation.clone(),
                message: e.to_string(),
            })?,
        };

        trace!(status, body = %text, "Received response");

        let body = parse_body(&text);
        if !(200..300).contains(&status) {
            return Ok(Err((status, body)));
        }

        let request_id = REQUEST_ID_HEADERS
            .iter()
            .find_map(|h| headers.get(*h).cloned());

        Ok(Ok(ApiResponse {
            status,
            headers,
            body,
            request_id,
        }))
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Sleep for `duration` unless `cancel` fires first
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
