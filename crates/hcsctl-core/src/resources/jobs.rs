//! Vendor job endpoints
//!
//! ECS, EVS and IMS report jobs at `GET /v1/{project}/jobs/{id}` on the
//! product that owns the job (IMS jobs live on ECS). RDS has its own
//! `GET /v3/{project}/jobs?id={id}`.
//!
//! Checkers make one attempt per poll; the poller owns the retry backoff.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::HcsClient;
use crate::error::{CoreError, Result};
use crate::job::{JobStatus, JobStatusCheck};
use crate::request::ApiRequest;

/// `jobs/{id}` on an ECS-style product
#[derive(Debug, Clone)]
pub struct EcsJobChecker {
    client: HcsClient,
    product: String,
    region: Option<String>,
}

impl EcsJobChecker {
    pub fn new(client: HcsClient, product: impl Into<String>, region: Option<&str>) -> Self {
        Self {
            client,
            product: product.into(),
            region: region.map(str::to_string),
        }
    }
}

#[async_trait]
impl JobStatusCheck for EcsJobChecker {
    async fn check(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobStatus> {
        let request = ApiRequest::get(&self.product, format!("jobs/{}", job_id))
            .version("v1")
            .maybe_region(self.region.as_deref());
        let body = self.client.execute_once(&request, cancel).await?.body;
        status_from(&self.product, &body, &body)
    }
}

/// `jobs?id=` on RDS
#[derive(Debug, Clone)]
pub struct RdsJobChecker {
    client: HcsClient,
    region: Option<String>,
}

impl RdsJobChecker {
    pub fn new(client: HcsClient, region: Option<&str>) -> Self {
        Self {
            client,
            region: region.map(str::to_string),
        }
    }
}

#[async_trait]
impl JobStatusCheck for RdsJobChecker {
    async fn check(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobStatus> {
        let request = ApiRequest::get("rds", "jobs")
            .version("v3")
            .query("id", job_id)
            .maybe_region(self.region.as_deref());
        let body = self.client.execute_once(&request, cancel).await?.body;
        let job = body.get("job").unwrap_or(&body);
        status_from("rds", job, job)
    }
}

fn status_from(product: &str, job: &Value, payload: &Value) -> Result<JobStatus> {
    let status = job
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::Protocol {
            product: product.to_string(),
            message: "job status response has no status field".to_string(),
        })?;
    let reason = ["fail_reason", "error_msg", "error_code"]
        .iter()
        .find_map(|field| job.get(field).and_then(Value::as_str))
        .filter(|reason| !reason.is_empty())
        .map(str::to_string);
    Ok(JobStatus::from_vendor(status, payload.clone(), reason))
}

/// Status check for jobs created through `product`
pub fn checker_for(
    client: &HcsClient,
    product: &str,
    region: Option<&str>,
) -> Result<Arc<dyn JobStatusCheck>> {
    let endpoint = client.resolver().product(product)?;
    let job_product = endpoint.job_product.as_deref().ok_or_else(|| {
        CoreError::Configuration(format!("product '{}' does not report jobs", product))
    })?;
    let region = region.or(client.default_region());
    Ok(match job_product {
        "rds" => Arc::new(RdsJobChecker::new(client.clone(), region)),
        other => Arc::new(EcsJobChecker::new(client.clone(), other, region)),
    })
}
