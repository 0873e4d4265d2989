//! Product endpoint resolution
//!
//! Every product lives at
//! `{scheme}://{prefix}.{region}.{auth_domain}/{version}/{project}/{resource}`.
//! The table of products is fixed when the client is built; deployments can
//! override the base URL of single products (private gateways, test servers)
//! and the pagination style the product uses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::credentials::Credentials;
use crate::error::{CoreError, Result};
use crate::request::ApiRequest;

/// Collections served without the project segment
const PROJECTLESS_PREFIXES: &[&str] = &[
    "images",
    "cloudimages",
    "nat_gateways",
    "lbaas",
    "products",
    "snat_rules",
    "dnat_rules",
    "networks",
    "ports",
];

/// How a product's list endpoints page through results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageStyle {
    /// `offset` counts items
    #[serde(alias = "offset")]
    OffsetLimit,
    /// `offset` is a 1-based page index
    PageNumber,
    /// Opaque `marker` returned by the previous page
    Marker,
    /// Everything comes back in one response
    Single,
}

impl fmt::Display for PageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageStyle::OffsetLimit => "offset-limit",
            PageStyle::PageNumber => "page-number",
            PageStyle::Marker => "marker",
            PageStyle::Single => "single",
        };
        f.write_str(name)
    }
}

impl FromStr for PageStyle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "offset" | "offset-limit" => Ok(PageStyle::OffsetLimit),
            "page" | "page-number" => Ok(PageStyle::PageNumber),
            "marker" => Ok(PageStyle::Marker),
            "single" => Ok(PageStyle::Single),
            other => Err(CoreError::Configuration(format!(
                "unknown pagination style '{}' (expected offset-limit, page-number, marker or single)",
                other
            ))),
        }
    }
}

/// Static description of one product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductEndpoint {
    pub name: String,
    pub host_prefix: String,
    pub version: String,
    /// Host carries a region segment
    pub regional: bool,
    /// Path carries the project id
    pub project_scoped: bool,
    pub pagination: PageStyle,
    pub page_size: u32,
    /// Product whose `jobs/{id}` endpoint reports this product's jobs
    pub job_product: Option<String>,
}

impl ProductEndpoint {
    fn builtin(
        name: &str,
        host_prefix: &str,
        version: &str,
        pagination: PageStyle,
        page_size: u32,
        job_product: Option<&str>,
    ) -> Self {
        Self {
            name: name.to_string(),
            host_prefix: host_prefix.to_string(),
            version: version.to_string(),
            regional: true,
            project_scoped: true,
            pagination,
            page_size,
            job_product: job_product.map(str::to_string),
        }
    }

    fn global(mut self) -> Self {
        self.regional = false;
        self
    }

    fn without_project(mut self) -> Self {
        self.project_scoped = false;
        self
    }
}

/// Resolves `(product, region)` pairs to URLs
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    scheme: String,
    auth_domain: String,
    project_id: Option<String>,
    products: HashMap<String, ProductEndpoint>,
    overrides: HashMap<String, Url>,
}

impl EndpointResolver {
    /// The built-in product table
    pub fn builtin(credentials: &Credentials) -> Self {
        use PageStyle::*;

        let products = [
            ProductEndpoint::builtin("ecs", "ecs", "v2", PageNumber, 50, Some("ecs")),
            ProductEndpoint::builtin("evs", "evs", "v2", OffsetLimit, 50, Some("evs")),
            ProductEndpoint::builtin("vpc", "vpc", "v1", Marker, 100, None),
            ProductEndpoint::builtin("ims", "ims", "v2", Marker, 100, Some("ecs")).without_project(),
            ProductEndpoint::builtin("rds", "rds", "v3", OffsetLimit, 100, Some("rds")),
            ProductEndpoint::builtin("dcs", "dcs", "v1.0", PageNumber, 50, None),
            ProductEndpoint::builtin("elb", "elb", "v2", Marker, 100, None),
            ProductEndpoint::builtin("nat", "nat", "v2", Marker, 100, None),
            ProductEndpoint::builtin("iam", "iam-apigateway-proxy", "v3", Single, 0, None)
                .global()
                .without_project(),
        ];

        Self {
            scheme: credentials.scheme().to_string(),
            auth_domain: credentials.auth_domain().to_string(),
            project_id: credentials.project_id().map(str::to_string),
            products: products
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
            overrides: HashMap::new(),
        }
    }

    /// Serve `product` from `base_url` instead of its derived host
    pub fn with_override(mut self, product: &str, base_url: &str) -> Result<Self> {
        self.product(product)?;
        let url = Url::parse(base_url).map_err(|e| {
            CoreError::Configuration(format!(
                "invalid endpoint override for '{}': {} ({})",
                product, base_url, e
            ))
        })?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Configuration(format!(
                "endpoint override for '{}' is not a base URL: {}",
                product, base_url
            )));
        }
        self.overrides.insert(product.to_string(), url);
        Ok(self)
    }

    /// Change the pagination style of `product`
    pub fn with_pagination(mut self, product: &str, style: PageStyle) -> Result<Self> {
        let endpoint = self
            .products
            .get_mut(product)
            .ok_or_else(|| unknown_product(product))?;
        endpoint.pagination = style;
        if endpoint.page_size == 0 && style != PageStyle::Single {
            endpoint.page_size = 100;
        }
        Ok(self)
    }

    pub fn product(&self, name: &str) -> Result<&ProductEndpoint> {
        self.products.get(name).ok_or_else(|| unknown_product(name))
    }

    /// Product names, sorted
    pub fn products(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.products.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// `{scheme}://{host}` (or the override) for a product in a region
    pub fn base_url(&self, product: &str, region: Option<&str>) -> Result<Url> {
        let endpoint = self.product(product)?;

        if let Some(url) = self.overrides.get(product) {
            return Ok(url.clone());
        }

        let host = if endpoint.regional {
            let region = region.filter(|r| !r.is_empty()).ok_or_else(|| {
                CoreError::Configuration(format!(
                    "product '{}' is regional but no region was given",
                    product
                ))
            })?;
            format!("{}.{}.{}", endpoint.host_prefix, region, self.auth_domain)
        } else {
            format!("{}.{}", endpoint.host_prefix, self.auth_domain)
        };

        Url::parse(&format!("{}://{}", self.scheme, host)).map_err(|e| {
            CoreError::Configuration(format!("cannot build URL for '{}': {}", product, e))
        })
    }

    /// Full URL for a request, query included
    pub fn resolve(&self, request: &ApiRequest) -> Result<Url> {
        let endpoint = self.product(&request.product)?;
        let mut url = self.base_url(&request.product, request.region.as_deref())?;
        let version = request.version.as_deref().unwrap_or(&endpoint.version);

        let mut segments: Vec<&str> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        segments.push(version);
        let project = self.project_id.as_deref();
        if let Some(project) = project
            && endpoint.project_scoped
            && !is_projectless(version, &request.resource)
        {
            segments.push(project);
        }
        let path = format!("/{}/{}", segments.join("/"), request.resource);
        url.set_path(path.trim_end_matches('/'));

        if request.query.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

fn is_projectless(version: &str, resource: &str) -> bool {
    PROJECTLESS_PREFIXES
        .iter()
        .any(|prefix| resource.starts_with(prefix))
        || (version == "v2.0" && resource.starts_with("subnets"))
}

fn unknown_product(name: &str) -> CoreError {
    CoreError::Configuration(format!("unknown product '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resolver() -> EndpointResolver {
        let creds = Credentials::access_key("AK", "SK", "hcs.example.com")
            .unwrap()
            .with_project("proj");
        EndpointResolver::builtin(&creds)
    }

    #[test]
    fn test_regional_url() {
        let req = ApiRequest::get("ecs", "cloudservers/detail")
            .region("region-1")
            .query("limit", 50);
        assert_eq!(
            resolver().resolve(&req).unwrap().as_str(),
            "https://ecs.region-1.hcs.example.com/v2/proj/cloudservers/detail?limit=50"
        );
    }

    #[test]
    fn test_version_override() {
        let req = ApiRequest::get("ecs", "jobs/abc").region("r").version("v1");
        assert_eq!(
            resolver().resolve(&req).unwrap().as_str(),
            "https://ecs.r.hcs.example.com/v1/proj/jobs/abc"
        );
    }

    #[test]
    fn test_projectless_resources() {
        let req = ApiRequest::get("vpc", "ports").region("r");
        assert_eq!(
            resolver().resolve(&req).unwrap().as_str(),
            "https://vpc.r.hcs.example.com/v1/ports"
        );

        let req = ApiRequest::get("vpc", "subnets").region("r").version("v2.0");
        assert_eq!(
            resolver().resolve(&req).unwrap().path(),
            "/v2.0/subnets"
        );

        // subnets keep the project under v1
        let req = ApiRequest::get("vpc", "subnets").region("r");
        assert_eq!(resolver().resolve(&req).unwrap().path(), "/v1/proj/subnets");

        let req = ApiRequest::get("ims", "cloudimages").region("r");
        assert_eq!(resolver().resolve(&req).unwrap().path(), "/v2/cloudimages");
    }

    #[test]
    fn test_global_product() {
        let req = ApiRequest::get("iam", "regions");
        assert_eq!(
            resolver().resolve(&req).unwrap().as_str(),
            "https://iam-apigateway-proxy.hcs.example.com/v3/regions"
        );
    }

    #[test]
    fn test_unknown_product_is_configuration_error() {
        let req = ApiRequest::get("nosuch", "things").region("r");
        let err = resolver().resolve(&req).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_region_is_configuration_error() {
        let req = ApiRequest::get("ecs", "cloudservers");
        assert!(matches!(
            resolver().resolve(&req),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_base_url_override() {
        let resolver = resolver()
            .with_override("ecs", "http://127.0.0.1:9000")
            .unwrap();
        // no region needed once overridden
        let req = ApiRequest::get("ecs", "cloudservers/detail").query("offset", 1);
        assert_eq!(
            resolver.resolve(&req).unwrap().as_str(),
            "http://127.0.0.1:9000/v2/proj/cloudservers/detail?offset=1"
        );

        let resolver = resolver
            .with_override("evs", "https://gw.internal/evs-proxy/")
            .unwrap();
        let req = ApiRequest::get("evs", "cloudvolumes");
        assert_eq!(
            resolver.resolve(&req).unwrap().as_str(),
            "https://gw.internal/evs-proxy/v2/proj/cloudvolumes"
        );
    }

    #[test]
    fn test_pagination_table() {
        let r = resolver();
        assert_eq!(r.product("ecs").unwrap().pagination, PageStyle::PageNumber);
        assert_eq!(r.product("evs").unwrap().pagination, PageStyle::OffsetLimit);
        assert_eq!(r.product("vpc").unwrap().pagination, PageStyle::Marker);
        assert_eq!(r.product("iam").unwrap().pagination, PageStyle::Single);
        assert_eq!(r.product("ims").unwrap().job_product.as_deref(), Some("ecs"));

        let r = r.with_pagination("vpc", PageStyle::OffsetLimit).unwrap();
        assert_eq!(r.product("vpc").unwrap().pagination, PageStyle::OffsetLimit);
        assert!(r.with_pagination("nosuch", PageStyle::Single).is_err());
    }

    #[test]
    fn test_page_style_parse() {
        assert_eq!("offset".parse::<PageStyle>().unwrap(), PageStyle::OffsetLimit);
        assert_eq!("page-number".parse::<PageStyle>().unwrap(), PageStyle::PageNumber);
        assert!("cursor".parse::<PageStyle>().is_err());
    }
}
