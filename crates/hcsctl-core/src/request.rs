//! Request descriptors
//!
//! An [`ApiRequest`] names *what* to call (product, region, resource) and
//! leaves *where* to the endpoint resolver.

use reqwest::Method;
use serde_json::Value;

/// One logical vendor call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub product: String,
    pub region: Option<String>,
    pub method: Method,
    /// Path below `/{version}/{project}/`, e.g. `cloudservers/detail`
    pub resource: String,
    /// Overrides the product's default API version for this call
    pub version: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, product: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            region: None,
            method,
            resource: resource.into().trim_start_matches('/').to_string(),
            version: None,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(product: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(Method::GET, product, resource)
    }

    pub fn post(product: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(Method::POST, product, resource)
    }

    pub fn put(product: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(Method::PUT, product, resource)
    }

    pub fn delete(product: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(Method::DELETE, product, resource)
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Use the region if one is given
    pub fn maybe_region(mut self, region: Option<&str>) -> Self {
        if let Some(region) = region {
            self.region = Some(region.to_string());
        }
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Replace every value of `key` with a single `value`
    pub fn set_query(&mut self, key: &str, value: impl ToString) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
    }

    pub fn remove_query(&mut self, key: &str) {
        self.query.retain(|(k, _)| k != key);
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `METHOD resource`, used as the operation name in errors and logs
    pub fn operation(&self) -> String {
        format!("{} {}", self.method, self.resource)
    }

    /// Whether the method changes server-side state
    pub fn is_mutating(&self) -> bool {
        is_mutating(&self.method)
    }
}

pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
