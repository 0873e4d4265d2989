//! The dispatch handle
//!
//! [`HcsClient`] ties the pieces together: requests are resolved to URLs,
//! executed by the transport, paged by the paginator and, when a mutating
//! call answers with a `job_id`, waited on by the job poller. Cloning is
//! cheap and every clone shares credentials, endpoints and caches.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::action::Action;
use crate::config::{PollConfig, Profile, ProxyConfig, ResolvedAuth, RetryConfig};
use crate::credentials::Credentials;
use crate::endpoint::{EndpointResolver, PageStyle};
use crate::error::{CoreError, Result};
use crate::job::{JobHandle, JobOutcome, JobPoller, JobStatusCheck};
use crate::paginate::{PageSource, Paginator};
use crate::request::ApiRequest;
use crate::resources::jobs::checker_for;
use crate::resources::regions::Region;
use crate::transport::{ApiResponse, PreparedRequest, Transport, TransportOptions};

struct ClientInner {
    credentials: Credentials,
    resolver: EndpointResolver,
    transport: Transport,
    default_region: Option<String>,
    retry: RetryConfig,
    poll: PollConfig,
    regions: RwLock<Option<Vec<Region>>>,
}

/// Handle for one account on one stack
#[derive(Clone)]
pub struct HcsClient {
    inner: Arc<ClientInner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for HcsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HcsClient")
            .field("credentials", &self.inner.credentials)
            .field("default_region", &self.inner.default_region)
            .field("read_only", &self.inner.transport.is_read_only())
            .finish_non_exhaustive()
    }
}

/// What the caller expects back from [`HcsClient::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// One JSON document
    Object,
    /// Every item of a paged listing
    Collection { items_key: Option<String> },
}

/// A request plus how to treat its result
pub struct Call {
    pub request: ApiRequest,
    pub expect: Expect,
    /// Wait for a returned `job_id`
    pub wait: bool,
    /// Status check to use instead of the product's job endpoint
    pub checker: Option<Arc<dyn JobStatusCheck>>,
}

impl Call {
    pub fn object(request: ApiRequest) -> Self {
        Self {
            request,
            expect: Expect::Object,
            wait: false,
            checker: None,
        }
    }

    pub fn collection(request: ApiRequest, items_key: Option<String>) -> Self {
        Self {
            request,
            expect: Expect::Collection { items_key },
            wait: false,
            checker: None,
        }
    }

    pub fn wait(mut self) -> Self {
        self.wait = true;
        self
    }

    pub fn checker(mut self, checker: Arc<dyn JobStatusCheck>) -> Self {
        self.checker = Some(checker);
        self.wait = true;
        self
    }
}

/// Result of [`HcsClient::dispatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Object(Value),
    Collection(Vec<Value>),
    Job(JobOutcome),
}

impl Payload {
    /// Collapse to plain JSON for output
    pub fn into_value(self) -> Value {
        match self {
            Payload::Object(v) => v,
            Payload::Collection(items) => Value::Array(items),
            Payload::Job(outcome) => serde_json::json!({
                "job_id": outcome.job_id,
                "elapsed_secs": outcome.elapsed.as_secs(),
                "result": outcome.payload,
            }),
        }
    }
}

/// Builder for [`HcsClient`]
#[derive(Debug, Clone)]
pub struct HcsClientBuilder {
    credentials: Credentials,
    region: Option<String>,
    read_only: bool,
    retry: RetryConfig,
    poll: PollConfig,
    proxy: Option<ProxyConfig>,
    request_timeout: Option<Duration>,
    endpoints: Vec<(String, String)>,
    pagination: Vec<(String, PageStyle)>,
    cancel: Option<CancellationToken>,
}

impl HcsClientBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            region: None,
            read_only: false,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
            proxy: None,
            request_timeout: None,
            endpoints: Vec::new(),
            pagination: Vec::new(),
            cancel: None,
        }
    }

    /// Everything a profile configures, keyring references resolved
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        let credentials = match profile.resolve_auth()? {
            ResolvedAuth::AccessKey {
                access_key,
                secret_key,
            } => Credentials::access_key(access_key, secret_key, &profile.auth_url)?,
            ResolvedAuth::Password {
                username,
                password,
                domain,
            } => Credentials::password(username, password, domain, &profile.auth_url)?,
        };
        let mut credentials = credentials;
        if let Some(project) = &profile.project_id {
            credentials = credentials.with_project(project.clone());
        }
        if let Some(domain_id) = &profile.domain_id {
            credentials = credentials.with_domain_id(domain_id.clone());
        }

        let resilience = profile.resilience();
        let mut builder = Self::new(credentials)
            .read_only(profile.read_only)
            .retry(resilience.retry)
            .poll(resilience.poll);
        builder.region = profile.region.clone();
        builder.proxy = profile.proxy.clone();
        builder.request_timeout = resilience.request_timeout_secs.map(Duration::from_secs);

        let mut endpoints: Vec<_> = profile.endpoints.iter().collect();
        endpoints.sort();
        for (product, url) in endpoints {
            builder = builder.endpoint(product, url);
        }
        let mut pagination: Vec<_> = profile.pagination.iter().collect();
        pagination.sort_by_key(|(product, _)| product.as_str());
        for (product, style) in pagination {
            builder = builder.pagination(product, *style);
        }
        Ok(builder)
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Serve one product from a fixed base URL
    pub fn endpoint(mut self, product: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.endpoints.push((product.into(), base_url.into()));
        self
    }

    pub fn pagination(mut self, product: impl Into<String>, style: PageStyle) -> Self {
        self.pagination.push((product.into(), style));
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Result<HcsClient> {
        let mut resolver = EndpointResolver::builtin(&self.credentials);
        for (product, url) in &self.endpoints {
            resolver = resolver.with_override(product, url)?;
        }
        for (product, style) in &self.pagination {
            resolver = resolver.with_pagination(product, *style)?;
        }

        let options = TransportOptions {
            read_only: self.read_only,
            retry: self.retry.clone(),
            proxy: self.proxy,
            request_timeout: self.request_timeout,
        };
        let transport = Transport::new(&self.credentials, &resolver, &options)?;

        debug!(
            key = %self.credentials.key_hint(),
            region = ?self.region,
            read_only = self.read_only,
            "Built HCS client"
        );

        Ok(HcsClient {
            inner: Arc::new(ClientInner {
                credentials: self.credentials,
                resolver,
                transport,
                default_region: self.region,
                retry: self.retry,
                poll: self.poll,
                regions: RwLock::new(None),
            }),
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl HcsClient {
    pub fn builder(credentials: Credentials) -> HcsClientBuilder {
        HcsClientBuilder::new(credentials)
    }

    /// A handle sharing everything with this one but bound to `cancel`
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn credentials(&self) -> &Credentials {
        &self.inner.credentials
    }

    pub fn resolver(&self) -> &EndpointResolver {
        &self.inner.resolver
    }

    pub fn default_region(&self) -> Option<&str> {
        self.inner.default_region.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.transport.is_read_only()
    }

    pub(crate) fn regions_cache(&self) -> &RwLock<Option<Vec<Region>>> {
        &self.inner.regions
    }

    /// Poller configured from the client's poll and retry settings
    pub fn poller(&self) -> JobPoller {
        JobPoller::from_config(&self.inner.poll, &self.inner.retry)
    }

    /// Execute one request with an explicit cancellation token
    pub async fn execute(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let prepared = self.prepare(request)?;
        self.inner.transport.execute(&prepared, cancel).await
    }

    /// Like [`execute`](Self::execute) but with a single attempt; transient
    /// failures are left to the caller's own retry loop
    pub async fn execute_once(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let prepared = self.prepare(request)?;
        self.inner.transport.execute_once(&prepared, cancel).await
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest> {
        let mut request = request.clone();
        if request.region.is_none() {
            request.region = self.inner.default_region.clone();
        }
        let url = self.inner.resolver.resolve(&request)?;
        Ok(
            PreparedRequest::new(&request.product, request.method.clone(), url, request.body.as_ref())?
                .with_operation(request.operation()),
        )
    }

    /// Execute one request and return the raw response body
    pub async fn request(&self, request: &ApiRequest) -> Result<Value> {
        Ok(self.execute(request, &self.cancel).await?.body)
    }

    /// Fetch one resource. A body with a single top-level key is unwrapped,
    /// so `{"server": {...}}` yields the server object.
    pub async fn get(&self, request: &ApiRequest) -> Result<Value> {
        Ok(unwrap_single(self.request(request).await?))
    }

    pub async fn get_as<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        Ok(serde_json::from_value(self.get(request).await?)?)
    }

    /// Every item of a listing, paged with the product's configured style
    pub async fn list(&self, request: &ApiRequest, items_key: Option<&str>) -> Result<Vec<Value>> {
        let endpoint = self.inner.resolver.product(&request.product)?;
        let mut paginator = Paginator::new(self, endpoint.pagination, endpoint.page_size);
        if let Some(key) = items_key {
            paginator = paginator.items_key(key);
        }
        paginator.collect(request, &self.cancel).await
    }

    pub async fn list_as<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        items_key: Option<&str>,
    ) -> Result<Vec<T>> {
        self.list(request, items_key)
            .await?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(CoreError::from))
            .collect()
    }

    /// POST, waiting for the job when one is returned
    pub async fn create(&self, request: &ApiRequest) -> Result<Value> {
        self.mutate(request).await
    }

    /// PUT, waiting for the job when one is returned
    pub async fn update(&self, request: &ApiRequest) -> Result<Value> {
        self.mutate(request).await
    }

    /// DELETE, waiting for the job when one is returned
    pub async fn delete(&self, request: &ApiRequest) -> Result<Value> {
        self.mutate(request).await
    }

    async fn mutate(&self, request: &ApiRequest) -> Result<Value> {
        let body = self.request(request).await?;
        let poller = self.poller();
        self.finish_job(&request.product, request.region.as_deref(), body, &poller)
            .await
    }

    /// Send an action without waiting for its job
    pub async fn submit(&self, action: &Action, region: Option<&str>) -> Result<Value> {
        let request = action.to_request()?.maybe_region(region);
        self.request(&request).await
    }

    /// Run an action to completion
    pub async fn perform(&self, action: &Action, region: Option<&str>) -> Result<Value> {
        let request = action.to_request()?.maybe_region(region);
        let body = self.request(&request).await?;
        let poller = action
            .poll_ceiling()
            .map(|(interval, timeout)| {
                JobPoller::new(interval, timeout).with_retry(self.inner.retry.clone())
            })
            .unwrap_or_else(|| self.poller());
        self.finish_job(&request.product, region, body, &poller).await
    }

    async fn finish_job(
        &self,
        product: &str,
        region: Option<&str>,
        body: Value,
        poller: &JobPoller,
    ) -> Result<Value> {
        let Some(job_id) = job_id_of(&body) else {
            return Ok(body);
        };
        if self.inner.resolver.product(product)?.job_product.is_none() {
            debug!(product, job_id, "Product has no job endpoint, not waiting");
            return Ok(body);
        }
        let outcome = self.wait_job(product, region, &job_id, poller).await?;
        Ok(outcome.payload)
    }

    /// Wait for a job of `product` with the vendor checker for that product
    pub async fn wait_job(
        &self,
        product: &str,
        region: Option<&str>,
        job_id: &str,
        poller: &JobPoller,
    ) -> Result<JobOutcome> {
        let checker = checker_for(self, product, region)?;
        info!(product, job_id, "Waiting for job");
        poller
            .wait(&JobHandle::new(job_id), checker.as_ref(), &self.cancel)
            .await
    }

    /// Run a [`Call`]
    pub async fn dispatch(&self, call: Call) -> Result<Payload> {
        match &call.expect {
            Expect::Collection { items_key } => Ok(Payload::Collection(
                self.list(&call.request, items_key.as_deref()).await?,
            )),
            Expect::Object => {
                let body = self.request(&call.request).await?;
                if !call.wait {
                    return Ok(Payload::Object(body));
                }
                let Some(job_id) = job_id_of(&body) else {
                    return Ok(Payload::Object(body));
                };
                let poller = self.poller();
                let handle = JobHandle::new(job_id);
                let outcome = match call.checker {
                    Some(checker) => poller.wait(&handle, checker.as_ref(), &self.cancel).await?,
                    None => {
                        let checker =
                            checker_for(self, &call.request.product, call.request.region.as_deref())?;
                        poller.wait(&handle, checker.as_ref(), &self.cancel).await?
                    }
                };
                Ok(Payload::Job(outcome))
            }
        }
    }
}

#[async_trait]
impl PageSource for HcsClient {
    async fn fetch_page(&self, request: &ApiRequest, cancel: &CancellationToken) -> Result<Value> {
        Ok(self.execute(request, cancel).await?.body)
    }
}

/// `job_id` of a job-returning response
pub fn job_id_of(body: &Value) -> Option<String> {
    match body.get("job_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

fn unwrap_single(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 => {
            let key = map.keys().next().cloned().unwrap_or_default();
            map.remove(&key).unwrap_or(Value::Null)
        }
        other => other,
    }
}
